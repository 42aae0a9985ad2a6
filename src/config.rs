//! Simulation parameters and their CLI binding (spec.md §6).

use clap::Parser;

/// RSA modulus size for every trader keypair. The original fixes this at 2048; kept as a
/// named constant rather than a CLI flag since the original never exposes it either.
pub const KEY_SIZE: usize = 2048;

/// Settlement rounds a bound cooperation ring gets before forced expiry.
pub const ROUNDS_COUNT: u32 = 10;

/// Milliseconds between a trader's coin-minting ticks.
pub const ROUND_LENGTH_MS: u64 = 1000;

/// Fractal counter ticks a banned trader is excluded from proposing/voting for.
pub const BAN_COUNT: i64 = 3;

/// Default fraction of decisions a `RandomVote` trader answers maliciously.
pub const DEFAULT_BAD_BEHAVIOR: f64 = 0.1;

/// Command-line surface, mirroring the original's `flag.Int`/`flag.Float64`/`flag.String`
/// set one for one.
#[derive(Debug, Parser)]
#[command(name = "lor", about = "Byzantine-tolerant cooperative-exchange simulator")]
pub struct Args {
    /// Number of coin types.
    #[arg(long = "type", default_value_t = 3)]
    pub type_count: u32,

    /// Run time in seconds.
    #[arg(long = "time", default_value_t = 60)]
    pub run_time: u64,

    /// Number of traders.
    #[arg(long = "trader", default_value_t = 100)]
    pub traders: usize,

    /// Number of traders that vote randomly-maliciously.
    #[arg(long = "random", default_value_t = 0)]
    pub randoms: usize,

    /// Number of traders that always vote maliciously.
    #[arg(long = "bad", default_value_t = 0)]
    pub bads: usize,

    /// Probability a random-voting trader acts maliciously on any single decision.
    #[arg(long = "alpha", default_value_t = DEFAULT_BAD_BEHAVIOR)]
    pub alpha: f64,

    /// File path to save the finished system to.
    #[arg(long = "save-to", default_value = "system.json")]
    pub save_to: String,

    /// File path to load a system from instead of running a fresh simulation.
    #[arg(long = "load-from", default_value = "")]
    pub load_from: String,
}

/// Validated simulation configuration, derived from `Args` (spec.md §6's "must reject ...
/// before starting" contract).
#[derive(Debug, Clone)]
pub struct Config {
    pub type_count: u32,
    pub run_time_secs: u64,
    pub traders: usize,
    pub randoms: usize,
    pub bads: usize,
    pub bad_behavior: f64,
    pub key_size: usize,
    pub save_to: String,
    pub load_from: String,
}

impl Config {
    /// Validates `args`, matching the original's `ParseFlags` rejection order exactly.
    pub fn from_args(args: Args) -> anyhow::Result<Self> {
        if args.type_count < 1 {
            anyhow::bail!("number of types must be positive");
        }
        if args.traders < 1 {
            anyhow::bail!("number of traders must be positive");
        }
        if args.randoms + args.bads > args.traders {
            anyhow::bail!("number of random and bad traders must be less than the total number of traders");
        }
        if args.alpha < 0.0 || args.alpha > 1.0 {
            anyhow::bail!("bad behavior percentage must be between 0 and 1");
        }

        Ok(Self {
            type_count: args.type_count,
            run_time_secs: args.run_time,
            traders: args.traders,
            randoms: args.randoms,
            bads: args.bads,
            bad_behavior: args.alpha,
            key_size: KEY_SIZE,
            save_to: args.save_to,
            load_from: args.load_from,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            type_count: 3,
            run_time_secs: 60,
            traders: 100,
            randoms: 0,
            bads: 0,
            bad_behavior: DEFAULT_BAD_BEHAVIOR,
            key_size: KEY_SIZE,
            save_to: "system.json".to_string(),
            load_from: String::new(),
        }
    }
}
