use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Load the catalog and serve the HTTP API
    Serve {
        /// Address to bind (overrides server.host)
        #[clap(long)]
        host: Option<String>,

        /// Port to listen on (overrides server.port)
        #[clap(short, long)]
        port: Option<u16>,
    },

    /// Print the live status of every collection
    Status {},

    /// Print everything known about one bird
    Bird {
        /// Bird id shared across the collections
        id: u64,
    },

    /// Search birds by a text description
    Search {
        /// Free-text description, e.g. "small bird with a red breast"
        query: String,

        /// Maximum number of results
        #[clap(short, long)]
        limit: Option<usize>,
    },
}
