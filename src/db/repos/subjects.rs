use rusqlite::{params, Row};

use crate::db::models::{Assignment, Task, User};
use crate::db::DbPool;
use crate::error::AppError;
use crate::validation::require_valid_id;

fn row_to_user(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        name: row.get("name")?,
        team_id: row.get("team_id")?,
        manager_id: row.get("manager_id")?,
        timezone: row.get("timezone")?,
        created_at: row.get("created_at")?,
    })
}

fn row_to_task(row: &Row) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get("id")?,
        title: row.get("title")?,
        team_id: row.get("team_id")?,
        assignee_id: row.get("assignee_id")?,
        status: row.get("status")?,
        activated_at: row.get("activated_at")?,
        created_at: row.get("created_at")?,
    })
}

/// Upsert a user record. The external user system is the source of truth;
/// this keeps the local mirror current.
pub fn upsert_user(pool: &DbPool, user: &User) -> Result<(), AppError> {
    require_valid_id("user id", &user.id)?;
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO users (id, name, team_id, manager_id, timezone, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           team_id = excluded.team_id,
           manager_id = excluded.manager_id,
           timezone = excluded.timezone",
        params![
            user.id,
            user.name,
            user.team_id,
            user.manager_id,
            user.timezone,
            user.created_at
        ],
    )?;
    Ok(())
}

/// Upsert a task record from the external task system.
pub fn upsert_task(pool: &DbPool, task: &Task) -> Result<(), AppError> {
    require_valid_id("task id", &task.id)?;
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO tasks (id, title, team_id, assignee_id, status, activated_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(id) DO UPDATE SET
           title = excluded.title,
           team_id = excluded.team_id,
           assignee_id = excluded.assignee_id,
           status = excluded.status,
           activated_at = excluded.activated_at",
        params![
            task.id,
            task.title,
            task.team_id,
            task.assignee_id,
            task.status,
            task.activated_at,
            task.created_at
        ],
    )?;
    Ok(())
}

pub fn get_user(pool: &DbPool, id: &str) -> Result<User, AppError> {
    let conn = pool.get()?;
    conn.query_row("SELECT * FROM users WHERE id = ?1", params![id], row_to_user)
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => AppError::NotFound(format!("User {id}")),
            other => AppError::Database(other),
        })
}

pub fn get_task(pool: &DbPool, id: &str) -> Result<Task, AppError> {
    let conn = pool.get()?;
    conn.query_row("SELECT * FROM tasks WHERE id = ?1", params![id], row_to_task)
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => AppError::NotFound(format!("Task {id}")),
            other => AppError::Database(other),
        })
}

/// The subject's line manager, if one is on record.
pub fn manager_of(pool: &DbPool, user_id: &str) -> Result<Option<String>, AppError> {
    let user = get_user(pool, user_id)?;
    Ok(user.manager_id)
}

/// All (active task, assignee) pairs the schedule sweep considers, with the
/// assignee's zone joined in.
pub fn active_assignments(pool: &DbPool) -> Result<Vec<Assignment>, AppError> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT t.id AS task_id, t.assignee_id AS user_id, t.team_id, t.activated_at, u.timezone
         FROM tasks t
         JOIN users u ON u.id = t.assignee_id
         WHERE t.status = 'active' AND t.assignee_id IS NOT NULL
         ORDER BY t.created_at ASC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(Assignment {
            task_id: row.get("task_id")?,
            user_id: row.get("user_id")?,
            team_id: row.get("team_id")?,
            activated_at: row.get("activated_at")?,
            timezone: row.get("timezone")?,
        })
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(AppError::Database)
}
