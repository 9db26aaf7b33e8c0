// Entry point for the ballot-chain CLI
// Each command opens this node's sled store, does one thing, and exits
use ballot_chain::{
    Command, ConsensusParams, LocalNetwork, MineOutcome, Opt, Settings, VotingNode, Wallet,
    Wallets,
};
use clap::Parser;
use log::{error, info, LevelFilter};
use rand::seq::SliceRandom;
use rand::Rng;
use std::process;

// Node id used when neither --node, NODE_ID nor a settings file names one
const DEFAULT_CLI_NODE: &str = "local";
const SIMULATION_CHOICES: [&str; 3] = ["Alice", "Bob", "Carol"];
const MAX_SIMULATION_ROUNDS: usize = 100;

fn main() {
    env_logger::builder()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let opt = Opt::parse();
    if let Err(e) = run(opt) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn load_settings(opt: &Opt) -> ballot_chain::Result<Settings> {
    let mut settings = match &opt.config {
        Some(path) => Settings::load(path)?,
        None => Settings::from_env_or(DEFAULT_CLI_NODE),
    };
    if let Some(node) = &opt.node {
        settings.node_id = node.clone();
    }
    Ok(settings)
}

fn run(opt: Opt) -> Result<(), Box<dyn std::error::Error>> {
    let settings = load_settings(&opt)?;
    match opt.command {
        Command::Createwallet { name } => {
            let mut wallets = Wallets::open_in(&settings.data_dir);
            let voter_id = wallets.create_wallet(name)?;
            println!("Your new voter id: {voter_id}");
        }
        Command::ListVoters => {
            let wallets = Wallets::open_in(&settings.data_dir);
            for voter_id in wallets.get_voter_ids() {
                match wallets.get_wallet(&voter_id).and_then(Wallet::get_display_name) {
                    Some(name) => println!("{voter_id} ({name})"),
                    None => println!("{voter_id}"),
                }
            }
        }
        Command::Vote { voter_id, choice } => {
            let wallets = Wallets::open_in(&settings.data_dir);
            let wallet = wallets
                .get_wallet(&voter_id)
                .ok_or_else(|| format!("No local wallet for voter {voter_id}"))?;
            let node = VotingNode::open(&settings)?;
            let tx = wallet.cast_vote(&choice)?;
            match node.submit(tx) {
                Ok(()) => println!("Ballot accepted for {choice}"),
                Err(e) if e.is_rejected_vote() => println!("Ballot rejected: {}", e.reason()),
                Err(e) => return Err(e.into()),
            }
        }
        Command::Mine => {
            let node = VotingNode::open(&settings)?;
            match node.mine()? {
                MineOutcome::Mined(block) => println!(
                    "Mined block {} with {} ballots: {}",
                    block.get_index(),
                    block.get_transactions().len(),
                    block.get_hash()
                ),
                MineOutcome::NoPendingTransactions => println!("No pending ballots"),
                MineOutcome::Cancelled => println!("Mining cancelled"),
            }
        }
        Command::Printchain => {
            let node = VotingNode::open(&settings)?;
            for block in node.chain()?.iter().rev() {
                println!("Block {}", block.get_index());
                println!("  Hash: {}", block.get_hash());
                println!("  Previous: {}", block.get_previous_hash());
                println!("  Merkle root: {}", block.get_merkle_root());
                println!(
                    "  Miner: {} (stake {}, difficulty {} of base {})",
                    block.get_miner_id(),
                    block.get_miner_stake(),
                    block.get_effective_difficulty(),
                    block.get_base_difficulty()
                );
                println!("  Nonce: {}  Timestamp: {}", block.get_nonce(), block.get_timestamp());
                for tx in block.get_transactions() {
                    println!("    {} -> {}", tx.get_voter_id(), tx.get_choice());
                }
                println!();
            }
        }
        Command::Results => {
            let node = VotingNode::open(&settings)?;
            let report = node.results_report()?;
            println!("Total ballots: {}", report.total_votes);
            for entry in report.entries {
                println!(
                    "  {:<16} {:>6} ({:.1}%)",
                    entry.choice, entry.count, entry.percentage
                );
            }
        }
        Command::Stats => {
            let node = VotingNode::open(&settings)?;
            let stats = node.stats()?;
            let difficulty = node.difficulty_report()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            println!("{}", serde_json::to_string_pretty(&difficulty)?);
            println!("{}", serde_json::to_string_pretty(&node.stake_leaderboard()?)?);
        }
        Command::Validate => {
            let node = VotingNode::open(&settings)?;
            match node.validate() {
                Ok(()) => println!("Chain is valid ({} blocks)", node.chain_len()?),
                Err(e) => {
                    println!("Chain is invalid: {e}");
                    return Err(e.into());
                }
            }
        }
        Command::Receipt { voter_id } => {
            let node = VotingNode::open(&settings)?;
            let Some(receipt) = node.vote_receipt(&voter_id)? else {
                return Err(format!("No committed ballot for voter {voter_id}").into());
            };
            println!("Block {} root {}", receipt.block_index, receipt.merkle_root);
            println!("{}", serde_json::to_string_pretty(&receipt.proof)?);
            println!("Proof verifies: {}", receipt.proof.verify(&receipt.merkle_root));
        }
        Command::Simulate { nodes, voters } => simulate(&settings.params, nodes, voters)?,
    }
    Ok(())
}

fn simulate(
    params: &ConsensusParams,
    nodes: usize,
    voters: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    if nodes == 0 {
        return Err("simulate needs at least one node".into());
    }
    let network = LocalNetwork::new(params, nodes)?;
    let mut rng = rand::thread_rng();

    for _ in 0..voters {
        let wallet = Wallet::new(None)?;
        let choice = SIMULATION_CHOICES
            .choose(&mut rng)
            .copied()
            .unwrap_or(SIMULATION_CHOICES[0]);
        let accepted = network.submit_everywhere(&wallet.cast_vote(choice)?);
        info!("Voter {} chose {choice} ({accepted} nodes accepted)", wallet.get_voter_id());
    }

    for round in 0..MAX_SIMULATION_ROUNDS {
        let miner = &network.nodes()[rng.gen_range(0..nodes)];
        let outcome = miner.mine()?;
        network.deliver()?;
        if let MineOutcome::Mined(block) = outcome {
            info!(
                "Round {round}: {} mined block {}",
                miner.get_node_id(),
                block.get_index()
            );
        }
        let mut idle = true;
        for node in network.nodes() {
            idle &= node.pending()?.is_empty();
        }
        if idle {
            break;
        }
    }
    network.exchange_chains()?;

    for node in network.nodes() {
        let stats = node.stats()?;
        println!(
            "{}: {} blocks, base difficulty {}, stake {}, valid {}",
            stats.node_id, stats.blocks, stats.base_difficulty, stats.stake, stats.chain_valid
        );
    }
    if let Some(node) = network.node(0) {
        for (choice, count) in node.results()? {
            println!("  {choice}: {count}");
        }
    }
    println!("Converged: {}", network.converged()?);
    network.shutdown()?;
    Ok(())
}
