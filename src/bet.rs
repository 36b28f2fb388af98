use crate::protocol::keys;
use crate::protocol::record::Record;

/// An immutable lottery bet. `document` is the identity reported back to the
/// client as a winner; `agency_id` is assigned by the client and simply
/// echoed, never generated server-side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bet {
    pub agency_id: String,
    pub first_name: String,
    pub last_name: String,
    pub document: String,
    pub birthdate: String,
    pub number: String,
}

impl Bet {
    /// Builds a `Bet` from a decoded record, defaulting missing fields to the
    /// empty string rather than rejecting the record.
    pub fn from_record(record: &Record) -> Self {
        let field = |key: &str| record.get(key).unwrap_or_default().to_string();
        Bet {
            agency_id: field(keys::AGENCY_ID),
            first_name: field(keys::NOMBRE),
            last_name: field(keys::APELLIDO),
            document: field(keys::DOCUMENTO),
            birthdate: field(keys::NACIMIENTO),
            number: field(keys::NUMERO),
        }
    }

    pub fn to_record(&self) -> Record {
        let mut record = Record::new();
        record
            .insert(keys::AGENCY_ID, &self.agency_id)
            .insert(keys::NOMBRE, &self.first_name)
            .insert(keys::APELLIDO, &self.last_name)
            .insert(keys::DOCUMENTO, &self.document)
            .insert(keys::NACIMIENTO, &self.birthdate)
            .insert(keys::NUMERO, &self.number);
        record
    }
}

/// The deterministic fairness rule shared by every `BetStore` implementation: a
/// bet wins iff its chosen number, taken modulo 100, equals the last two
/// digits of its document. Seedless and reproducible, so draw scenarios in
/// tests never depend on faking randomness.
pub fn lottery_predicate(bet: &Bet) -> bool {
    let number: u64 = match bet.number.trim().parse() {
        Ok(n) => n,
        Err(_) => return false,
    };
    let document: u64 = match bet.document.trim().parse() {
        Ok(n) => n,
        Err(_) => return false,
    };
    number % 100 == document % 100
}
