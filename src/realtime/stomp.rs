// Minimal STOMP 1.2 frames, enough to subscribe to a broker topic over WebSocket.
//
// Frame layout: COMMAND \n (key:value \n)* \n body \0
// A bare newline is a heart-beat.

use std::fmt::Write as _;

use crate::net::TransportError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: &str) -> Self {
        Self { command: command.to_string(), headers: Vec::new(), body: String::new() }
    }

    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.headers.push((key.to_string(), value.to_string()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        // First occurrence wins when a header repeats
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn connect(host: &str) -> Self {
        Frame::new("CONNECT")
            .header("accept-version", "1.2")
            .header("host", host)
            .header("heart-beat", "0,0")
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new("SUBSCRIBE")
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    pub fn unsubscribe(id: &str) -> Self {
        Frame::new("UNSUBSCRIBE").header("id", id)
    }

    pub fn disconnect() -> Self {
        Frame::new("DISCONNECT")
    }

    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.command.len() + self.body.len() + 32);
        out.push_str(&self.command);
        out.push('\n');
        for (k, v) in &self.headers {
            let _ = writeln!(out, "{}:{}", escape(k), escape(v));
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }
}

/// Decoded inbound text: a frame, or a heart-beat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Frame(Frame),
    Heartbeat,
}

pub fn decode(text: &str) -> Result<Inbound, TransportError> {
    let text = text.trim_start_matches(['\r', '\n']);
    if text.is_empty() {
        return Ok(Inbound::Heartbeat);
    }

    let text = text.strip_suffix('\0').unwrap_or(text);
    let (head, body) = match text.find("\n\n") {
        Some(i) => (&text[..i], &text[i + 2..]),
        None => match text.find("\r\n\r\n") {
            Some(i) => (&text[..i], &text[i + 4..]),
            None => (text, ""),
        },
    };

    let mut lines = head.lines();
    let command = lines
        .next()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| TransportError::Protocol("frame without command".to_string()))?;

    let mut headers = Vec::new();
    for line in lines {
        let (k, v) = line
            .split_once(':')
            .ok_or_else(|| TransportError::Protocol(format!("malformed header line {line:?}")))?;
        headers.push((unescape(k), unescape(v.trim_end_matches('\r'))));
    }

    Ok(Inbound::Frame(Frame {
        command: command.to_string(),
        headers,
        body: body.to_string(),
    }))
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
