/// An ordered key/value mapping decoded from, or destined for, a single frame
/// payload. Insertion order is preserved on encode; duplicate keys keep the
/// last value written but retain the position of the first insertion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    entries: Vec<(String, String)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => self.entries.push((key, value)),
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for Record {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

/// Escapes `|` and `:` inside a value so it can be embedded in a `|`-joined field list.
fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '|' => out.push_str("\\|"),
            ':' => out.push_str("\\:"),
            '\\' => out.push_str("\\\\"),
            other => out.push(other),
        }
    }
    out
}

/// Encodes a record as `k1:v1|k2:v2|...\n`, escaping values in place.
pub fn encode(record: &Record) -> String {
    let mut out = String::new();
    for (i, (key, value)) in record.iter().enumerate() {
        if i > 0 {
            out.push('|');
        }
        out.push_str(key);
        out.push(':');
        out.push_str(&escape(value));
    }
    out.push('\n');
    out
}

/// Decodes a payload string (trailing `\n` optional) into a `Record`.
///
/// The unescape pass is a hand-rolled, single-character lookbehind: a `\`
/// makes the following character literal, whatever it is. This is load-bearing
/// for values that contain literal backslashes, so it is never replaced with a
/// regex-based splitter.
pub fn decode(payload: &str) -> Record {
    let payload = payload.strip_suffix('\n').unwrap_or(payload);

    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = payload.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
                // A trailing backslash with nothing after it is simply dropped.
            }
            '|' => {
                fields.push(std::mem::take(&mut current));
            }
            other => current.push(other),
        }
    }
    fields.push(current);

    let mut record = Record::new();
    for field in fields {
        if let Some(colon) = find_unescaped_colon(&field) {
            let (key, value) = field.split_at(colon);
            record.insert(key, &value[1..]);
        }
        // Fields without a `:` are ignored.
    }
    record
}

/// The unescape pass above has already resolved `\:` to a literal `:`, so by
/// the time a field reaches here every remaining `:` is plain text; the first
/// one is always the key/value separator.
fn find_unescaped_colon(field: &str) -> Option<usize> {
    field.find(':')
}
