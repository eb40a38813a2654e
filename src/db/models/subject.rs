use serde::{Deserialize, Serialize};

// Minimal mirrors of the external task/user systems. Management of these
// records lives outside this service; the engine reads them to decide whom
// to prompt, in which time zone, and whom to escalate to.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub team_id: Option<String>,
    pub manager_id: Option<String>,
    /// IANA zone name, e.g. "Europe/Prague".
    pub timezone: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub team_id: Option<String>,
    pub assignee_id: Option<String>,
    pub status: String,
    pub activated_at: Option<String>,
    pub created_at: String,
}

/// One (active task, assignee) pair the schedule sweep considers.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub task_id: String,
    pub user_id: String,
    pub team_id: Option<String>,
    pub activated_at: Option<String>,
    pub timezone: String,
}
