use rusqlite::Connection;
use tracing::info;

/// Run SQLite migrations
pub fn run_migrations(conn: &Connection) -> Result<(), String> {
    info!("Running SQLite migrations");

    create_clinic_tables(conn)?;
    create_billing_tables(conn)?;
    create_billing_indexes(conn)?;

    info!("SQLite migrations completed successfully");
    Ok(())
}

/// Create the tables readable through a signed form link
fn create_clinic_tables(conn: &Connection) -> Result<(), String> {
    info!("Creating patients, examinations and appointments tables if not exists");

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS patients (
            id TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            birth_date TEXT,
            email TEXT,
            phone TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        CREATE TABLE IF NOT EXISTS examinations (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            category TEXT,
            device_id TEXT,
            duration_minutes INTEGER,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        CREATE TABLE IF NOT EXISTS appointments (
            id TEXT PRIMARY KEY,
            patient_id TEXT,
            examination_id TEXT,
            location_id TEXT,
            start_time TEXT,
            status TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );",
    ).map_err(|e| e.to_string())?;

    Ok(())
}

/// Create the billing questionnaire tables
fn create_billing_tables(conn: &Connection) -> Result<(), String> {
    info!("Creating billing tables if not exists");

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS billing_forms (
            id TEXT PRIMARY KEY,
            examination_id TEXT,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS billing_questions (
            id TEXT PRIMARY KEY,
            billing_form_id TEXT NOT NULL,
            question_text TEXT NOT NULL,
            question_type TEXT NOT NULL,
            required INTEGER NOT NULL DEFAULT 0,
            position INTEGER NOT NULL DEFAULT 0,
            depends_on_question_id TEXT,
            depends_on_option_id TEXT
        );
        CREATE TABLE IF NOT EXISTS billing_options (
            id TEXT PRIMARY KEY,
            question_id TEXT NOT NULL,
            option_text TEXT NOT NULL,
            position INTEGER NOT NULL DEFAULT 0
        );
        CREATE TABLE IF NOT EXISTS billing_answers (
            id TEXT PRIMARY KEY,
            appointment_id TEXT NOT NULL,
            billing_form_id TEXT NOT NULL,
            question_id TEXT NOT NULL,
            option_id TEXT,
            answer_text TEXT,
            created_at TEXT NOT NULL
        );",
    ).map_err(|e| e.to_string())?;

    Ok(())
}

/// Create indexes for the per-form and per-appointment lookups
fn create_billing_indexes(conn: &Connection) -> Result<(), String> {
    info!("Creating billing indexes");

    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_billing_questions_form
            ON billing_questions (billing_form_id, position);
        CREATE INDEX IF NOT EXISTS idx_billing_options_question
            ON billing_options (question_id, position);
        CREATE INDEX IF NOT EXISTS idx_billing_answers_appointment_form
            ON billing_answers (appointment_id, billing_form_id);",
    ).map_err(|e| format!("Failed to create index: {}", e))?;

    Ok(())
}
