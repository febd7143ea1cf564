//! Configuration for the mml-morse demonstration.
//!
//! Maps command-line arguments onto the core `TransportConfig` and the
//! channel simulation parameters, generating defaults where needed
//! (including randomized channel defaults that are reproducible with a seed).
//!
//! # Philosophy
//!
//! The tool should work with ZERO arguments, using sensible defaults.
//! All defaults are printed so runs are reproducible.

use anyhow::{Context, Result};
use clap::Parser;
use mml_morse_core::channel::ChannelConfig;
use mml_morse_core::security::IntegrityKey;
use mml_morse_core::{CompressionLevel, MorseMode, RedundancyLevel, TransportConfig};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "mml-morse")]
#[command(version, about = "Send documents through a simulated lossy Morse channel")]
pub struct Args {
    /// Random seed for determinism (default: time-based)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Number of sample documents to send
    #[arg(long, default_value_t = 4)]
    pub documents: usize,

    /// Compression level: light, standard or aggressive
    #[arg(long, default_value_t = CompressionLevel::Standard)]
    pub compression: CompressionLevel,

    /// Morse mode: strict or optimized
    #[arg(long, default_value_t = MorseMode::Optimized)]
    pub morse: MorseMode,

    /// Redundancy level: none, low, standard or high
    #[arg(long, default_value_t = RedundancyLevel::Standard)]
    pub redundancy: RedundancyLevel,

    /// Payload bytes per fragment
    #[arg(long, default_value_t = 64)]
    pub fragment_size: usize,

    /// Keying speed in words per minute
    #[arg(long, default_value_t = 20)]
    pub wpm: u32,

    /// Receive session timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    /// Fragment loss rate 0.0-1.0 (default: random 0-0.10)
    #[arg(long)]
    pub loss: Option<f64>,

    /// Disable fragment loss (same as --loss 0)
    #[arg(long, conflicts_with = "loss")]
    pub no_loss: bool,

    /// Byte corruption rate 0.0-1.0 (default: random 0-0.05)
    #[arg(long)]
    pub corruption: Option<f64>,

    /// Duplication rate 0.0-1.0 (default: random 0-0.05)
    #[arg(long)]
    pub duplication: Option<f64>,

    /// Reorder window in fragments (default: random 0-8)
    #[arg(long)]
    pub reorder_window: Option<usize>,

    /// Shared secret for fragment authentication tags
    #[arg(long)]
    pub key: Option<String>,

    /// Print resolved configuration
    #[arg(long)]
    pub print_config: bool,

    /// Don't print metrics summary
    #[arg(long)]
    pub no_metrics: bool,
}

/// Complete configuration for a run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Seed for document generation
    pub seed: u64,

    pub documents: usize,

    pub transport: TransportConfig,

    pub channel: ChannelConfig,

    pub key: Option<IntegrityKey>,

    pub print_config: bool,

    pub print_metrics: bool,
}

impl Config {
    /// Resolve arguments into a validated configuration.
    ///
    /// Channel impairments left unspecified are drawn from the seed, so
    /// `--seed` alone makes the whole run deterministic.
    pub fn from_args(args: Args) -> Result<Self> {
        let seed = args.seed.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|t| t.as_millis() as u64)
                .unwrap_or(0)
        });
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let transport = TransportConfig {
            compression_level: args.compression,
            morse_mode: args.morse,
            max_fragment_size: args.fragment_size,
            redundancy_level: args.redundancy,
            session_timeout: Duration::from_secs(args.timeout),
            wpm: args.wpm,
            ..TransportConfig::default()
        };
        transport.validate().context("invalid transport options")?;

        let loss_rate = match (args.no_loss, args.loss) {
            (true, _) => 0.0,
            (false, Some(rate)) => rate,
            // Bias toward small loss rates
            (false, None) => {
                let r: f64 = rng.gen();
                r * r * 0.10
            }
        };
        let channel = ChannelConfig {
            loss_rate,
            corruption_rate: args.corruption.unwrap_or_else(|| rng.gen_range(0.0..0.05)),
            duplicate_rate: args.duplication.unwrap_or_else(|| rng.gen_range(0.0..0.05)),
            reorder_window: args.reorder_window.unwrap_or_else(|| rng.gen_range(0..=8)),
            seed,
        };
        channel.validate().context("invalid channel options")?;

        let key = args
            .key
            .map(|secret| IntegrityKey::new(secret.into_bytes()))
            .transpose()
            .context("invalid --key")?;

        Ok(Config {
            seed,
            documents: args.documents,
            transport,
            channel,
            key,
            print_config: args.print_config,
            print_metrics: !args.no_metrics,
        })
    }

    /// Print the configuration in human-readable form.
    pub fn print(&self) {
        println!("=== Configuration ===");
        println!("Seed: {}", self.seed);
        println!("Documents: {}", self.documents);
        println!();
        println!("=== Transport ===");
        println!("Compression: {}", self.transport.compression_level);
        println!("Morse mode: {}", self.transport.morse_mode);
        println!("Fragment size: {} bytes", self.transport.max_fragment_size);
        println!("Redundancy: {}", self.transport.redundancy_level);
        println!("Keying speed: {} wpm", self.transport.wpm);
        println!("Session timeout: {} s", self.transport.session_timeout.as_secs());
        println!("Authentication: {}", if self.key.is_some() { "on" } else { "off" });
        println!();
        println!("=== Channel Simulation ===");
        println!("Loss rate: {:.2}%", self.channel.loss_rate * 100.0);
        println!("Corruption rate: {:.2}%", self.channel.corruption_rate * 100.0);
        println!("Duplication rate: {:.2}%", self.channel.duplicate_rate * 100.0);
        println!("Reorder window: {} fragments", self.channel.reorder_window);
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("mml-morse").chain(argv.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_args(parse(&["--seed", "42"])).unwrap();
        assert_eq!(config.seed, 42);
        assert_eq!(config.transport.max_fragment_size, 64);
        assert_eq!(config.transport.redundancy_level, RedundancyLevel::Standard);
        assert!(config.channel.loss_rate <= 0.10);
        assert!(config.key.is_none());
        assert!(config.print_metrics);
    }

    #[test]
    fn test_seed_determinism() {
        let a = Config::from_args(parse(&["--seed", "7"])).unwrap();
        let b = Config::from_args(parse(&["--seed", "7"])).unwrap();
        assert_eq!(a.channel, b.channel);
    }

    #[test]
    fn test_explicit_options() {
        let config = Config::from_args(parse(&[
            "--seed",
            "1",
            "--compression",
            "aggressive",
            "--morse",
            "strict",
            "--redundancy",
            "high",
            "--no-loss",
            "--reorder-window",
            "0",
            "--key",
            "secret",
        ]))
        .unwrap();
        assert_eq!(config.transport.compression_level, CompressionLevel::Aggressive);
        assert_eq!(config.transport.morse_mode, MorseMode::Strict);
        assert_eq!(config.channel.loss_rate, 0.0);
        assert_eq!(config.channel.reorder_window, 0);
        assert!(config.key.is_some());
    }

    #[test]
    fn test_invalid_options_rejected() {
        assert!(Config::from_args(parse(&["--fragment-size", "0"])).is_err());
        assert!(Config::from_args(parse(&["--loss", "2.0"])).is_err());
        assert!(Args::try_parse_from(["mml-morse", "--morse", "fast"]).is_err());
    }
}
