//! mml-morse: send sample documents through a simulated Morse radio link.
//!
//! Each document is normalized, compressed, keyed and fragmented, pushed
//! through a lossy channel, then reassembled and decoded. Per-document
//! results and a metrics summary are printed at the end.

mod config;
mod input_gen;

use anyhow::Result;
use clap::Parser;
use config::{Args, Config};
use mml_morse_core::channel::ChannelSimulator;
use mml_morse_core::error::{Error, ReassemblyError};
use mml_morse_core::fragment::Fragment;
use mml_morse_core::metrics::{Metrics, ReorderTracker};
use mml_morse_core::pipeline::{Delivery, Reception};
use mml_morse_core::{normalize, Receiver, Sender, StaticDictionary};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Body paragraphs per generated document.
const PARAGRAPHS: usize = 4;

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::from_args(Args::parse())?;
    if config.print_config {
        config.print();
    }

    let metrics = run(&config)?;
    if config.print_metrics {
        println!("{}", metrics.summary());
    }
    Ok(())
}

fn run(config: &Config) -> Result<Metrics> {
    let statics = StaticDictionary::builtin();
    let mut sender = Sender::new(statics, config.transport.clone())?;
    let mut receiver = Receiver::new(statics, &config.transport);
    if let Some(key) = &config.key {
        sender = sender.with_key(key.clone());
        receiver = receiver.with_key(key.clone());
    }

    let mut channel = ChannelSimulator::new(config.channel);
    let mut reorder = ReorderTracker::new();
    let mut metrics = Metrics::new();

    for index in 0..config.documents {
        let id = index as u32;
        let seed = config.seed.wrapping_add(index as u64);
        let normalized = normalize(&input_gen::generate_document(seed, PARAGRAPHS));
        if !normalized.losses.is_lossless() {
            info!(
                transmission_id = id,
                tags = ?normalized.losses.tags,
                "unsupported markup normalized away"
            );
        }

        let transmission = sender.send(&normalized.tree, id)?;
        metrics.record_send(&transmission.report, &transmission.stats);

        let mut reception = None;
        for bytes in channel.transmit(transmission.serialize()) {
            let fragment = match Fragment::deserialize(&bytes) {
                Ok(fragment) => fragment,
                Err(e) => {
                    metrics.fragments_invalid += 1;
                    debug!(error = %e, "unreadable fragment");
                    continue;
                }
            };
            if reorder.track(fragment.transmission_id, fragment.sequence_index) {
                metrics.fragments_reordered += 1;
            }
            match receiver.insert(fragment) {
                Ok(Some(done)) => reception = Some(done),
                Ok(None) => {}
                Err(e) if e.is_fatal() => {
                    warn!(transmission_id = id, error = %e, "transmission failed");
                    break;
                }
                Err(e) => debug!(error = %e, "fragment rejected"),
            }
        }
        reorder.clear(id);

        let reception = match reception {
            Some(done) => Some(done),
            None => match receiver.end_of_transmission(id) {
                Ok(done) => Some(done),
                Err(Error::Reassembly(ReassemblyError::UnknownSession(_))) => None,
                Err(e) => {
                    warn!(transmission_id = id, error = %e, "transmission failed");
                    None
                }
            },
        };

        match reception {
            Some(reception) => {
                metrics.record_reception(&reception.stats, reception.is_complete());
                report(&reception, normalized.tree == *reception.tree());
            }
            None => {
                metrics.documents_failed += 1;
                println!("#{id}: nothing received");
            }
        }
    }

    metrics.fragments_dropped = channel.stats().dropped;
    metrics.complete();
    Ok(metrics)
}

fn report(reception: &Reception, identical: bool) {
    let stats = &reception.stats;
    let outcome = match &reception.delivery {
        Delivery::Complete(_) if identical => "complete".to_string(),
        Delivery::Complete(_) => "complete (differs from source)".to_string(),
        Delivery::Partial(partial) => format!(
            "partial, {} gap(s), {} lost marker(s)",
            partial.gaps.len(),
            partial.lost_markers()
        ),
    };
    println!(
        "#{}: {outcome}; {}/{} fragments, {} recovered, ratio {:.2}, air time {:.1} s",
        reception.transmission_id,
        stats.fragments_received,
        stats.fragments_sent,
        stats.recovered_fragments,
        stats.compression_ratio,
        stats.keying_time.as_secs_f64()
    );
    debug!(mml = %reception.tree().to_mml(), "received document");
}
