//! Sample document generation for the demonstration.
//!
//! Without real input we generate small HTML-like source trees with
//! interesting transport characteristics.
//!
//! # Design
//!
//! Generated documents have:
//! - Vocabulary from the static dictionary (compresses to one byte per word)
//! - Station names and numbers repeated within a document (adaptive entries)
//! - Occasional markup outside the MML tag set (normalization losses)
//!
//! This makes compression and loss behavior visible in the metrics.

use mml_morse_core::SourceNode;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const VOCABULARY: &[&str] = &[
    "le", "la", "de", "des", "et", "pour", "dans", "sur", "avec", "message", "urgence",
    "transmission", "réseau", "signal", "fréquence", "station", "est", "relais", "secteur",
    "équipe", "route", "coupée", "besoin", "eau", "abri", "médical", "nord", "sud",
];

const STATIONS: &[&str] = &["Alpha", "Bravo", "Charlie", "Delta", "Echo", "Foxtrot"];

/// Generate one sample source tree.
///
/// # Arguments
/// - `seed`: random seed for determinism
/// - `paragraphs`: number of body paragraphs
pub fn generate_document(seed: u64, paragraphs: usize) -> SourceNode {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let station = STATIONS.choose(&mut rng).copied().unwrap_or("Alpha");

    let mut body = vec![SourceNode::element(
        "h1",
        vec![SourceNode::text(format!("Bulletin {station} {}", rng.gen_range(1..100)))],
    )];

    for _ in 0..paragraphs {
        let paragraph = match rng.gen_range(0..10) {
            // 20% lists
            0..=1 => {
                let items = (0..rng.gen_range(2..5))
                    .map(|_| {
                        let text = SourceNode::text(sentence(&mut rng, station));
                        SourceNode::element("li", vec![text])
                    })
                    .collect();
                SourceNode::element("ul", items)
            }

            // 10% markup outside the tag set
            2 => SourceNode::element(
                "figure",
                vec![
                    SourceNode::element(
                        "figcaption",
                        vec![SourceNode::text(sentence(&mut rng, station))],
                    ),
                    SourceNode::element("script", vec![SourceNode::text("track()")]),
                ],
            ),

            // 10% links
            3 => SourceNode::element(
                "p",
                vec![
                    SourceNode::text(sentence(&mut rng, station)),
                    SourceNode::element("a", vec![SourceNode::text("détails")])
                        .with_attribute(
                            "href",
                            format!("http://{}.example/b", station.to_lowercase()),
                        )
                        .with_attribute("onclick", "go()"),
                ],
            ),

            // 60% plain paragraphs
            _ => SourceNode::element("p", vec![SourceNode::text(sentence(&mut rng, station))]),
        };
        body.push(paragraph);
    }

    SourceNode::element(
        "html",
        vec![
            SourceNode::element(
                "head",
                vec![SourceNode::element("title", vec![SourceNode::text(station)])],
            ),
            SourceNode::element("body", body),
        ],
    )
}

/// A short sentence mentioning the station.
fn sentence(rng: &mut ChaCha8Rng, station: &str) -> String {
    let mut words: Vec<String> = (0..rng.gen_range(4..12))
        .filter_map(|_| VOCABULARY.choose(rng).map(|w| w.to_string()))
        .collect();
    let at = rng.gen_range(0..=words.len());
    words.insert(at, format!("station {station}"));
    let mut text = words.join(" ");
    text.push('.');
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use mml_morse_core::normalize;

    #[test]
    fn test_generate_document() {
        let normalized = normalize(&generate_document(42, 5));
        assert!(normalized.tree.node_count() > 5);
        assert!(normalized.tree.plain_text().contains("station"));
    }

    #[test]
    fn test_determinism() {
        assert_eq!(generate_document(12345, 6), generate_document(12345, 6));
    }

    #[test]
    fn test_different_seeds() {
        assert_ne!(generate_document(1, 6), generate_document(2, 6));
    }

    #[test]
    fn test_unsupported_markup_is_reported() {
        let losses = (0..20)
            .map(|seed| normalize(&generate_document(seed, 8)).losses.unsupported_tags())
            .sum::<usize>();
        assert!(losses > 0);
    }
}
