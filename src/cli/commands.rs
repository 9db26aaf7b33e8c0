use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "ballot-chain", about = "Signed-vote blockchain node")]
pub struct Opt {
    #[arg(long, global = true, help = "TOML settings file")]
    pub config: Option<PathBuf>,
    #[arg(long, global = true, help = "Node id (overrides settings and NODE_ID)")]
    pub node: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "createwallet", about = "Create a new voter wallet")]
    Createwallet {
        #[arg(long, help = "Display name attached to this voter's ballots")]
        name: Option<String>,
    },
    #[command(name = "listvoters", about = "Print local voter ids")]
    ListVoters,
    #[command(name = "vote", about = "Sign a ballot and add it to the node's pool")]
    Vote {
        #[arg(help = "Voter id of a local wallet")]
        voter_id: String,
        #[arg(help = "Choice to vote for")]
        choice: String,
    },
    #[command(name = "mine", about = "Seal all pending ballots into a block")]
    Mine,
    #[command(name = "printchain", about = "Print all blocks in the chain")]
    Printchain,
    #[command(name = "results", about = "Tally committed ballots")]
    Results,
    #[command(name = "stats", about = "Show node, difficulty and stake status")]
    Stats,
    #[command(name = "validate", about = "Fully validate the stored chain")]
    Validate,
    #[command(name = "receipt", about = "Print and check the Merkle proof of a ballot")]
    Receipt {
        #[arg(help = "Voter id whose ballot to prove")]
        voter_id: String,
    },
    #[command(
        name = "simulate",
        about = "Run an in-process network of nodes until it converges"
    )]
    Simulate {
        #[arg(long, default_value_t = 3, help = "Number of nodes")]
        nodes: usize,
        #[arg(long, default_value_t = 6, help = "Number of voters")]
        voters: usize,
    },
}
