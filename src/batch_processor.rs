use crate::bet::Bet;
use crate::protocol::Record;

/// Result of validating and materializing a decoded batch.
pub struct BatchResult {
    pub ok: bool,
    pub message: String,
    pub bets: Vec<Bet>,
}

/// Validates `declared` against the number of bet records actually decoded
/// and, on success, materializes `Bet` values. Never touches the store;
/// the server persists under its own lock so writers to the store stay
/// serialized regardless of which worker handled the batch.
pub fn process_batch(declared: usize, records: &[Record]) -> BatchResult {
    if records.len() != declared {
        return BatchResult {
            ok: false,
            message: format!(
                "Invalid batch: expected {} bets, got {}",
                declared,
                records.len()
            ),
            bets: Vec::new(),
        };
    }

    let bets = records.iter().map(Bet::from_record).collect();
    BatchResult {
        ok: true,
        message: "batch accepted".to_string(),
        bets,
    }
}
