use crate::identifier::Identifier;
use crate::store::distributed::DataResult;
use ahash::AHashMap;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::warn;

pub const DEFAULT_TRUST_WEIGHT: f64 = 1.0;

/// How much each peer's answer counts when replicas disagree.
#[derive(Debug, Clone, Default)]
pub struct TrustWeights {
    weights: AHashMap<Identifier, f64>,
}

impl TrustWeights {
    pub fn new() -> Self {
        TrustWeights::default()
    }

    /// Weights keyed by identifier hex, as they appear under `[trust]` in the
    /// config file. Keys that are not identifiers and negative weights are
    /// skipped with a warning.
    pub fn from_hex_map(map: &HashMap<String, f64>) -> Self {
        let mut trust = TrustWeights::new();
        for (hex_key, weight) in map {
            match Identifier::from_str(hex_key) {
                Ok(identifier) if *weight >= 0.0 => trust.set(identifier, *weight),
                Ok(_) => warn!("ignoring negative trust weight for {}", hex_key),
                Err(err) => warn!("ignoring trust entry {:?}: {}", hex_key, err),
            }
        }
        trust
    }

    pub fn set(&mut self, identifier: Identifier, weight: f64) {
        self.weights.insert(identifier, weight);
    }

    pub fn weight(&self, identifier: &Identifier) -> f64 {
        self.weights
            .get(identifier)
            .copied()
            .unwrap_or(DEFAULT_TRUST_WEIGHT)
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

///
/// Pick one value out of the answers a get produced.
///
/// Identical payloads pool the weight of every source that returned them, an
/// authoritative answer counting twice its source's weight. The payload with
/// the largest total wins; on a tie the one seen first wins.
///
pub fn select_by_trust(results: &[DataResult], trust: &TrustWeights) -> Option<Vec<u8>> {
    let mut totals: Vec<(&[u8], f64)> = vec![];
    for result in results {
        let mut weight = trust.weight(&result.source.identifier);
        if result.authoritative {
            weight *= 2.0;
        }
        match totals
            .iter_mut()
            .find(|(data, _)| *data == result.data.as_slice())
        {
            Some((_, total)) => *total += weight,
            None => totals.push((result.data.as_slice(), weight)),
        }
    }

    let mut best: Option<(&[u8], f64)> = None;
    for (data, total) in totals {
        match best {
            Some((_, best_total)) if total <= best_total => {}
            _ => best = Some((data, total)),
        }
    }
    best.map(|(data, _)| data.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::networking::contact::Contact;

    fn result(source: &Contact, data: &[u8], authoritative: bool) -> DataResult {
        DataResult {
            source: source.clone(),
            data: data.to_vec(),
            authoritative,
        }
    }

    fn contact(port: u16) -> Contact {
        Contact::new(
            Identifier::random(),
            "overlay",
            "127.0.0.1".parse().unwrap(),
            port,
        )
    }

    #[test]
    fn majority_of_equal_weights_wins() {
        let (a, b, c) = (contact(1), contact(2), contact(3));
        let results = vec![
            result(&a, b"old", false),
            result(&b, b"new", false),
            result(&c, b"new", false),
        ];
        assert_eq!(
            select_by_trust(&results, &TrustWeights::new()),
            Some(b"new".to_vec())
        );
        assert_eq!(select_by_trust(&[], &TrustWeights::new()), None);
    }

    #[test]
    fn weights_and_authority_shift_the_outcome() {
        let (a, b, c) = (contact(1), contact(2), contact(3));
        let results = vec![
            result(&a, b"old", false),
            result(&b, b"new", false),
            result(&c, b"new", false),
        ];
        let mut trust = TrustWeights::new();
        trust.set(a.identifier, 5.0);
        assert_eq!(select_by_trust(&results, &trust), Some(b"old".to_vec()));

        // one authoritative answer matches two cached ones, first seen wins
        let results = vec![
            result(&a, b"owner", true),
            result(&b, b"copy", false),
            result(&c, b"copy", false),
        ];
        assert_eq!(
            select_by_trust(&results, &TrustWeights::new()),
            Some(b"owner".to_vec())
        );
    }

    #[test]
    fn weights_from_config_map() {
        let good = Identifier::from_data(b"peer");
        let mut map = HashMap::new();
        map.insert(good.to_hex(), 3.5);
        map.insert(String::from("not hex"), 2.0);
        map.insert(Identifier::from_data(b"other").to_hex(), -1.0);

        let trust = TrustWeights::from_hex_map(&map);
        assert_eq!(trust.len(), 1);
        assert_eq!(trust.weight(&good), 3.5);
        assert_eq!(trust.weight(&Identifier::from_data(b"other")), DEFAULT_TRUST_WEIGHT);
    }
}
