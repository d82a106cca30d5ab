//! The client ⇄ gateway wire grammar: `CODE~arg1~arg2~...`.
//!
//! `Code` is kept as a plain 4-byte tag rather than an enum of argument
//! shapes, because several codes (`SAVF`, `CREA`) carry a JSON argument
//! whose shape is already modeled by [`crate::rpc`] and [`crate::tree`]
//! types — [`Frame`] only owns the split between tag and raw argument
//! strings, dispatch lives in the gateway.

use anyhow::{anyhow, bail};

/// A single parsed gateway frame: a 4-letter code plus its `~`-separated
/// arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub code: String,
    pub args: Vec<String>,
}

impl Frame {
    pub fn new(code: impl Into<String>, args: Vec<String>) -> Self {
        Frame { code: code.into(), args }
    }

    pub fn no_args(code: impl Into<String>) -> Self {
        Frame { code: code.into(), args: Vec::new() }
    }

    /// Parses `CODE~arg1~arg2` into a [`Frame`]. Arguments never contain
    /// `~` themselves (binary payloads are base64-encoded upstream of this
    /// parser), so a plain split is sufficient.
    pub fn parse(text: &str) -> anyhow::Result<Frame> {
        let mut parts = text.split('~');
        let code = parts.next().ok_or_else(|| anyhow!("empty frame"))?;
        if code.len() != 4 {
            bail!("frame code must be 4 characters, got {:?}", code);
        }
        let args = parts.map(|s| s.to_string()).collect();
        Ok(Frame { code: code.to_string(), args })
    }

    /// Serializes back to `CODE~arg1~arg2`, or just `CODE` with no args.
    pub fn encode(&self) -> String {
        if self.args.is_empty() {
            self.code.clone()
        } else {
            let mut out = self.code.clone();
            for arg in &self.args {
                out.push('~');
                out.push_str(arg);
            }
            out
        }
    }

    pub fn arg(&self, idx: usize) -> anyhow::Result<&str> {
        self.args
            .get(idx)
            .map(|s| s.as_str())
            .ok_or_else(|| anyhow!("frame {:?} missing argument {}", self.code, idx))
    }
}

/// Builds an `ERRR~<code>` reply frame. This is the single chokepoint for
/// that format string — every caller goes through here rather than
/// formatting `ERRR~...` ad hoc.
pub fn error_frame(code: &str) -> String {
    Frame::new("ERRR", vec![code.to_string()]).encode()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_frame_with_args() {
        let f = Frame::parse("GETF~a/b.py").unwrap();
        assert_eq!(f.code, "GETF");
        assert_eq!(f.args, vec!["a/b.py".to_string()]);
    }

    #[test]
    fn parses_frame_with_no_args() {
        let f = Frame::parse("OUTT").unwrap();
        assert_eq!(f.code, "OUTT");
        assert!(f.args.is_empty());
    }

    #[test]
    fn rejects_short_code() {
        assert!(Frame::parse("OK~foo").is_err());
    }

    #[test]
    fn round_trips() {
        let f = Frame::new("REGI", vec!["a@x.com".to_string(), "pw".to_string()]);
        let encoded = f.encode();
        assert_eq!(encoded, "REGI~a@x.com~pw");
        assert_eq!(Frame::parse(&encoded).unwrap(), f);
    }

    #[test]
    fn error_frame_format() {
        assert_eq!(error_frame("001"), "ERRR~001");
    }
}
