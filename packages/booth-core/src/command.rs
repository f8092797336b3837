//! Decoder for the comma-delimited touchscreen command protocol.
//!
//! One message, one command: comma-separated ASCII fields, first field is
//! the verb. Decoding never fails on garbage; unusable arguments surface
//! as `None` and the dispatcher treats them as no-ops.

/// One inbound command: a verb plus ordered string arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    verb: String,
    args: Vec<String>,
}

impl Command {
    /// Decode one raw message. Bytes are taken lossily as UTF-8 and split
    /// on commas with surrounding whitespace trimmed. Returns None for an
    /// empty message (those are a shutdown request, handled upstream).
    pub fn parse(bytes: &[u8]) -> Option<Command> {
        if bytes.is_empty() {
            return None;
        }
        let text = String::from_utf8_lossy(bytes);
        let mut fields = text.split(',');
        let verb = fields.next().unwrap_or("").trim().to_string();
        let args = fields.map(|field| field.trim().to_string()).collect();
        Some(Command { verb, args })
    }

    pub fn verb(&self) -> &str {
        &self.verb
    }

    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(|s| s.as_str())
    }

    /// Non-negative integer argument at `index`; None when absent or not
    /// parseable.
    pub fn uint_arg(&self, index: usize) -> Option<u32> {
        self.arg(index)?.parse().ok()
    }

    /// Signed integer argument at `index`; range checks belong to the
    /// caller.
    pub fn int_arg(&self, index: usize) -> Option<i64> {
        self.arg(index)?.parse().ok()
    }
}
