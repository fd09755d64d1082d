//! Emitted schedule: per-user request sequences and output serialization.

use std::io::{self, Write};

/// One committed inference request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledRequest {
    /// User index (0-based).
    pub user: usize,
    pub send_time: i64,
    /// 1-based server identifier.
    pub server_id: usize,
    /// 1-based NPU identifier within the server.
    pub npu_id: usize,
    pub batch: i64,
}

/// Append-only schedule. Entries are kept in commit order so a replay can
/// reproduce NPU occupancy exactly; per-user views are derived from index
/// lists.
#[derive(Debug, Clone)]
pub struct Plan {
    entries: Vec<ScheduledRequest>,
    per_user: Vec<Vec<usize>>,
}

impl Plan {
    pub fn new(user_count: usize) -> Self {
        Plan {
            entries: Vec::new(),
            per_user: vec![Vec::new(); user_count],
        }
    }

    pub fn push(&mut self, request: ScheduledRequest) {
        self.per_user[request.user].push(self.entries.len());
        self.entries.push(request);
    }

    /// All requests in commit order.
    pub fn entries(&self) -> &[ScheduledRequest] {
        &self.entries
    }

    /// Number of requests emitted for one user.
    pub fn request_count(&self, user: usize) -> usize {
        self.per_user[user].len()
    }

    pub fn total_requests(&self) -> usize {
        self.entries.len()
    }

    /// Requests of one user, in send order.
    pub fn user_requests(&self, user: usize) -> impl Iterator<Item = &ScheduledRequest> + '_ {
        self.per_user[user].iter().map(move |&i| &self.entries[i])
    }

    /// Samples scheduled so far for one user.
    pub fn scheduled_samples(&self, user: usize) -> i64 {
        self.user_requests(user).map(|r| r.batch).sum()
    }

    pub fn user_count(&self) -> usize {
        self.per_user.len()
    }

    /// Serialize the plan: two lines per user, the request count and the
    /// space-separated `send server npu batch` groups. The second line is
    /// printed even when empty.
    pub fn write_to<W: Write>(&self, mut out: W) -> io::Result<()> {
        for user in 0..self.per_user.len() {
            writeln!(out, "{}", self.request_count(user))?;
            let mut first = true;
            for req in self.user_requests(user) {
                if !first {
                    write!(out, " ")?;
                }
                first = false;
                write!(
                    out,
                    "{} {} {} {}",
                    req.send_time, req.server_id, req.npu_id, req.batch
                )?;
            }
            writeln!(out)?;
        }
        Ok(())
    }

    /// Render the plan to a string (test and logging convenience).
    pub fn render(&self) -> String {
        let mut buf = Vec::new();
        self.write_to(&mut buf).expect("writing to a Vec cannot fail");
        String::from_utf8(buf).expect("plan output is ASCII")
    }
}
