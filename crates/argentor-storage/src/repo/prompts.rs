use crate::error::StorageResult;
use crate::records::Prompt;
use argentor_core::PromptId;
use rusqlite::{params, Connection, OptionalExtension};

const SELECT_COLUMNS: &str = "prompt_id, name, version, body, created_at";

/// Inserts a new version of a prompt. Callers pick the next version
/// themselves (typically `latest(name).map_or(1, |p| p.version + 1)`);
/// the `(name, version)` unique index rejects a clash.
pub fn insert(conn: &Connection, prompt: &Prompt) -> StorageResult<()> {
    conn.execute(
        &format!("INSERT INTO prompts ({SELECT_COLUMNS}) VALUES (?1,?2,?3,?4,?5)"),
        params![
            prompt.prompt_id.to_string(),
            prompt.name,
            prompt.version,
            prompt.body,
            prompt.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// The highest-versioned row for `name`, if any exist.
pub fn latest(conn: &Connection, name: &str) -> StorageResult<Option<Prompt>> {
    conn.query_row(
        &format!("SELECT {SELECT_COLUMNS} FROM prompts WHERE name = ?1 ORDER BY version DESC LIMIT 1"),
        params![name],
        row_to_prompt,
    )
    .optional()
    .map_err(crate::error::StorageError::from)
}

/// One name's one specific version, if it exists.
pub fn get_version(conn: &Connection, name: &str, version: i64) -> StorageResult<Option<Prompt>> {
    conn.query_row(
        &format!("SELECT {SELECT_COLUMNS} FROM prompts WHERE name = ?1 AND version = ?2"),
        params![name, version],
        row_to_prompt,
    )
    .optional()
    .map_err(crate::error::StorageError::from)
}

/// Registers `body` under `name`, reusing the existing version if the body
/// is byte-for-byte identical to the current latest one, else allocating
/// the next version number. Mirrors `get_or_create_prompt_version`'s
/// content-addressed dedup (there by `sha256`; here by direct body
/// comparison, since the full body is already the thing being stored and
/// compared — a hash column would only save comparison bytes, not change
/// the semantics).
pub fn register(conn: &Connection, name: &str, body: &str) -> StorageResult<Prompt> {
    if let Some(existing) = latest(conn, name)? {
        if existing.body == body {
            return Ok(existing);
        }
        let prompt = Prompt {
            prompt_id: PromptId::new(),
            name: name.to_string(),
            version: existing.version + 1,
            body: body.to_string(),
            created_at: argentor_core::utc_now(),
        };
        insert(conn, &prompt)?;
        return Ok(prompt);
    }
    let prompt = Prompt { prompt_id: PromptId::new(), name: name.to_string(), version: 1, body: body.to_string(), created_at: argentor_core::utc_now() };
    insert(conn, &prompt)?;
    Ok(prompt)
}

/// The latest version of every distinct prompt name, ordered by name.
pub fn list_latest(conn: &Connection) -> StorageResult<Vec<Prompt>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SELECT_COLUMNS} FROM prompts p \
         WHERE version = (SELECT MAX(version) FROM prompts WHERE name = p.name) \
         ORDER BY name"
    ))?;
    let rows = stmt.query_map([], row_to_prompt)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(crate::error::StorageError::from)
}

fn row_to_prompt(row: &rusqlite::Row<'_>) -> rusqlite::Result<Prompt> {
    let prompt_id: String = row.get(0)?;
    let created_at: String = row.get(4)?;
    let invalid = |idx: usize, reason: String| rusqlite::Error::InvalidColumnType(idx, reason, rusqlite::types::Type::Text);
    Ok(Prompt {
        prompt_id: PromptId::parse(&prompt_id).map_err(|e| invalid(0, e.to_string()))?,
        name: row.get(1)?,
        version: row.get(2)?,
        body: row.get(3)?,
        created_at: argentor_core::parse_iso8601(&created_at).map_err(|e| invalid(4, e.to_string()))?,
    })
}
