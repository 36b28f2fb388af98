use crate::protocol::keys;
use crate::protocol::record::{self, Record};

/// Encodes a list of bet records as a single outer `Record` with a
/// `BATCH_SIZE` field and one `BET_i` field per bet, each holding the bet's
/// own serialized (newline-stripped) form. The outer encode pass escapes the
/// inner `|` and `:` automatically, which is what makes the nesting
/// self-describing on decode.
pub fn encode_batch(bets: &[Record]) -> Record {
    let mut outer = Record::new();
    outer.insert(keys::BATCH_SIZE, bets.len().to_string());
    for (i, bet) in bets.iter().enumerate() {
        let inner_payload = record::encode(bet);
        let inner_payload = inner_payload.strip_suffix('\n').unwrap_or(&inner_payload);
        outer.insert(keys::bet_key(i + 1), inner_payload);
    }
    outer
}

/// Decodes an outer `Record` into `(K, bets)`. A missing or non-numeric
/// `BATCH_SIZE` yields `(0, [])`. Bets whose `BET_i` key is absent for some `i`
/// in `1..=K` are silently skipped rather than treated as an error.
pub fn decode_batch(outer: &Record) -> (usize, Vec<Record>) {
    let declared: usize = match outer.get(keys::BATCH_SIZE).and_then(|v| v.parse().ok()) {
        Some(k) => k,
        None => return (0, Vec::new()),
    };

    let mut bets = Vec::new();
    for i in 1..=declared {
        if let Some(inner_payload) = outer.get(&keys::bet_key(i)) {
            let mut owned = inner_payload.to_string();
            owned.push('\n');
            bets.push(record::decode(&owned));
        }
    }
    (declared, bets)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bet_record(agency: &str) -> Record {
        let mut r = Record::new();
        r.insert("AGENCY_ID", agency)
            .insert("NOMBRE", "Ana")
            .insert("NUMERO", "7|7:7");
        r
    }

    #[test]
    fn batch_round_trip_s3() {
        let bets = vec![bet_record("1"), bet_record("2")];
        let outer = encode_batch(&bets);
        assert_eq!(outer.get("BATCH_SIZE"), Some("2"));

        let (k, decoded) = decode_batch(&outer);
        assert_eq!(k, 2);
        assert_eq!(decoded, bets);
    }

    #[test]
    fn missing_batch_size_yields_empty() {
        let outer = Record::new();
        assert_eq!(decode_batch(&outer), (0, Vec::new()));
    }

    #[test]
    fn non_numeric_batch_size_yields_empty() {
        let mut outer = Record::new();
        outer.insert("BATCH_SIZE", "not-a-number");
        assert_eq!(decode_batch(&outer), (0, Vec::new()));
    }

    #[test]
    fn missing_inner_bet_is_skipped() {
        let mut outer = Record::new();
        outer.insert("BATCH_SIZE", "2");
        outer.insert("BET_1", "NOMBRE:Ana");
        // BET_2 deliberately missing.

        let (k, decoded) = decode_batch(&outer);
        assert_eq!(k, 2);
        assert_eq!(decoded.len(), 1);
    }

    #[test]
    fn nested_escaping_round_trips_through_outer_encode() {
        let bets = vec![bet_record("weird|agency:name")];
        let outer = encode_batch(&bets);
        let wire = record::encode(&outer);
        let decoded_outer = record::decode(&wire);
        let (_, decoded) = decode_batch(&decoded_outer);
        assert_eq!(decoded, bets);
    }
}
