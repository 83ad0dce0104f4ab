use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "iked", about = "IKE/IPsec ModeCfg session daemon")]
pub struct Cli {
    /// Path to the TOML connection configuration.
    #[arg(short, long, default_value = "/etc/iked/iked.toml")]
    pub config: PathBuf,

    /// Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn filter_directive(&self) -> &'static str {
        match self.verbose {
            0 => "iked=info,ike_core=info",
            1 => "iked=debug,ike_core=debug",
            _ => "iked=trace,ike_core=trace",
        }
    }
}
