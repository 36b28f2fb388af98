//! Record key names used on the wire. Centralized so the codec, the batch
//! processor, and the server all agree on the same literal strings.

pub const BATCH_SIZE: &str = "BATCH_SIZE";
pub const BET_PREFIX: &str = "BET_";

pub const ACTION: &str = "ACTION";
pub const FINISH_BETTING: &str = "FINISH_BETTING";
pub const AGENCY_ID: &str = "AGENCY_ID";

pub const NOMBRE: &str = "NOMBRE";
pub const APELLIDO: &str = "APELLIDO";
pub const DOCUMENTO: &str = "DOCUMENTO";
pub const NACIMIENTO: &str = "NACIMIENTO";
pub const NUMERO: &str = "NUMERO";

pub const STATUS: &str = "STATUS";
pub const STATUS_SUCCESS: &str = "SUCCESS";
pub const STATUS_ERROR: &str = "ERROR";
pub const MESSAGE: &str = "MESSAGE";
pub const WINNERS: &str = "WINNERS";

pub fn bet_key(i: usize) -> String {
    format!("{BET_PREFIX}{i}")
}
