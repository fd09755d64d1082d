//! Instance parsing.
//!
//! The input is a single whitespace-separated integer stream: server count
//! and per-server `(g, k, m)` triples, user count and per-user `(s, e, cnt)`
//! triples, the N×M latency matrix, and finally the per-user memory
//! coefficients `(a, b)`. A legacy stream variant carries a single global
//! `(a, b)` pair instead; it is detected by token count and fanned out to
//! every user.
//!
//! Parsing is all-or-nothing: any structural defect is fatal and no plan is
//! emitted. Degenerate but well-formed parameters (zero NPUs, zero speed,
//! memory below a user's intercept) are left for the scheduler to skip.

use thiserror::Error;

/// Fatal defects in the input stream.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unexpected end of input while reading {0}")]
    UnexpectedEof(&'static str),
    #[error("invalid integer token `{0}`")]
    InvalidToken(String),
    #[error("negative {what} count {value}")]
    NegativeCount { what: &'static str, value: i64 },
    #[error("expected {expected} memory coefficient tokens (or 2 for the legacy global pair), found {found}")]
    MemoryCoefficients { expected: usize, found: usize },
}

/// Raw server triple as read from the stream.
#[derive(Debug, Clone, Copy)]
pub struct RawServer {
    pub npu_count: i64,
    pub speed: i64,
    pub memory: i64,
}

/// Raw user triple as read from the stream.
#[derive(Debug, Clone, Copy)]
pub struct RawUser {
    pub window_start: i64,
    pub deadline: i64,
    pub samples: i64,
}

/// Parsed scheduling instance, before derived tables are built.
#[derive(Debug, Clone)]
pub struct Instance {
    pub servers: Vec<RawServer>,
    pub users: Vec<RawUser>,
    /// `latency[server][user]`.
    pub latency: Vec<Vec<i64>>,
    /// One `(a, b)` pair per user.
    pub memory_params: Vec<(i64, i64)>,
}

struct Tokens<'a> {
    tokens: Vec<&'a str>,
    pos: usize,
}

impl<'a> Tokens<'a> {
    fn new(text: &'a str) -> Self {
        Tokens {
            tokens: text.split_whitespace().collect(),
            pos: 0,
        }
    }

    fn next(&mut self, what: &'static str) -> Result<i64, ParseError> {
        let token = self
            .tokens
            .get(self.pos)
            .ok_or(ParseError::UnexpectedEof(what))?;
        self.pos += 1;
        token
            .parse::<i64>()
            .map_err(|_| ParseError::InvalidToken((*token).to_string()))
    }

    fn remaining(&self) -> usize {
        self.tokens.len() - self.pos
    }
}

/// Parse a complete instance from an input stream already read to memory.
pub fn parse_instance(text: &str) -> Result<Instance, ParseError> {
    let mut tokens = Tokens::new(text);

    let n = tokens.next("server count")?;
    if n < 0 {
        return Err(ParseError::NegativeCount {
            what: "server",
            value: n,
        });
    }
    let n = n as usize;

    let mut servers = Vec::with_capacity(n);
    for _ in 0..n {
        servers.push(RawServer {
            npu_count: tokens.next("server NPU count")?,
            speed: tokens.next("server speed")?,
            memory: tokens.next("server memory")?,
        });
    }

    let m = tokens.next("user count")?;
    if m < 0 {
        return Err(ParseError::NegativeCount {
            what: "user",
            value: m,
        });
    }
    let m = m as usize;

    let mut users = Vec::with_capacity(m);
    for _ in 0..m {
        users.push(RawUser {
            window_start: tokens.next("user window start")?,
            deadline: tokens.next("user deadline")?,
            samples: tokens.next("user sample count")?,
        });
    }

    let mut latency = Vec::with_capacity(n);
    for _ in 0..n {
        let mut row = Vec::with_capacity(m);
        for _ in 0..m {
            row.push(tokens.next("latency entry")?);
        }
        latency.push(row);
    }

    // Per-user coefficients, or the legacy single global pair.
    let remaining = tokens.remaining();
    let memory_params = if remaining == 2 * m {
        let mut params = Vec::with_capacity(m);
        for _ in 0..m {
            let a = tokens.next("memory coefficient a")?;
            let b = tokens.next("memory coefficient b")?;
            params.push((a, b));
        }
        params
    } else if remaining == 2 {
        let a = tokens.next("memory coefficient a")?;
        let b = tokens.next("memory coefficient b")?;
        vec![(a, b); m]
    } else {
        return Err(ParseError::MemoryCoefficients {
            expected: 2 * m,
            found: remaining,
        });
    };

    Ok(Instance {
        servers,
        users,
        latency,
        memory_params,
    })
}
