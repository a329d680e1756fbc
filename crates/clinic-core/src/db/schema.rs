//! SQLite schema definition.

/// Complete database schema for the scheduling core.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Patients
-- ============================================================================

CREATE TABLE IF NOT EXISTS patients (
    patient_id TEXT PRIMARY KEY,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    date_of_birth TEXT,                           -- YYYY-MM-DD
    phone TEXT NOT NULL DEFAULT '',
    email TEXT NOT NULL DEFAULT '',
    address TEXT,
    insurance_provider TEXT,
    insurance_id TEXT,
    medical_history TEXT NOT NULL DEFAULT '[]',   -- JSON array of strings
    allergies TEXT NOT NULL DEFAULT '[]',         -- JSON array of strings
    current_medications TEXT NOT NULL DEFAULT '[]', -- JSON array of strings
    total_visits INTEGER NOT NULL DEFAULT 0 CHECK (total_visits >= 0),
    last_visit TEXT,                              -- YYYY-MM-DD
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_patients_phone ON patients(phone);
CREATE INDEX IF NOT EXISTS idx_patients_email ON patients(email);
CREATE INDEX IF NOT EXISTS idx_patients_name ON patients(first_name, last_name);

-- ============================================================================
-- Providers (weekly template, read-only during scheduling)
-- ============================================================================

CREATE TABLE IF NOT EXISTS providers (
    provider_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    specialty TEXT NOT NULL DEFAULT '',
    location TEXT NOT NULL DEFAULT '',
    working_start INTEGER NOT NULL,
    working_end INTEGER NOT NULL,
    lunch_start INTEGER NOT NULL,
    lunch_end INTEGER NOT NULL,
    CHECK (working_start < working_end),
    CHECK (lunch_start <= lunch_end)
);

CREATE TABLE IF NOT EXISTS provider_hours (
    provider_id TEXT NOT NULL REFERENCES providers(provider_id) ON DELETE CASCADE,
    weekday INTEGER NOT NULL CHECK (weekday BETWEEN 0 AND 6),  -- 0 = Monday
    hour INTEGER NOT NULL CHECK (hour BETWEEN 0 AND 23),
    PRIMARY KEY (provider_id, weekday, hour)
);

-- ============================================================================
-- Appointments (status transitions only, never deleted)
-- ============================================================================

CREATE TABLE IF NOT EXISTS appointments (
    appointment_id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL REFERENCES patients(patient_id),
    provider_id TEXT NOT NULL REFERENCES providers(provider_id),
    appointment_date TEXT NOT NULL,               -- YYYY-MM-DD
    start_time TEXT NOT NULL,                     -- HH:MM
    duration_minutes INTEGER NOT NULL
        CHECK (duration_minutes > 0 AND duration_minutes % 30 = 0),
    status TEXT NOT NULL DEFAULT 'scheduled'
        CHECK (status IN ('scheduled', 'confirmed', 'cancelled', 'completed', 'no_show')),
    insurance TEXT,                               -- JSON object {carrier, member_id, group_number}
    notes TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_appointments_provider_date
    ON appointments(provider_id, appointment_date);
CREATE INDEX IF NOT EXISTS idx_appointments_patient ON appointments(patient_id);

-- ============================================================================
-- Reminders (three per appointment)
-- ============================================================================

CREATE TABLE IF NOT EXISTS reminders (
    reminder_id TEXT PRIMARY KEY,
    appointment_id TEXT NOT NULL REFERENCES appointments(appointment_id),
    patient_id TEXT NOT NULL REFERENCES patients(patient_id),
    reminder_type TEXT NOT NULL
        CHECK (reminder_type IN ('initial', 'form_check', 'confirmation')),
    scheduled_time TEXT NOT NULL,                 -- YYYY-MM-DD HH:MM:SS, local
    sent INTEGER NOT NULL DEFAULT 0,
    sms_delivered INTEGER NOT NULL DEFAULT 0,
    email_delivered INTEGER NOT NULL DEFAULT 0,
    response TEXT,
    claimed_until TEXT,                           -- dispatcher lease, YYYY-MM-DD HH:MM:SS
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (appointment_id, reminder_type)
);

CREATE INDEX IF NOT EXISTS idx_reminders_pending ON reminders(sent, scheduled_time);
CREATE INDEX IF NOT EXISTS idx_reminders_patient ON reminders(patient_id);

-- sent never reverts
CREATE TRIGGER IF NOT EXISTS reminders_sent_monotonic BEFORE UPDATE OF sent ON reminders
WHEN old.sent = 1 AND new.sent = 0
BEGIN
    SELECT RAISE(ABORT, 'Reminder sent flag cannot revert');
END;

-- response is written once
CREATE TRIGGER IF NOT EXISTS reminders_response_once BEFORE UPDATE OF response ON reminders
WHEN old.response IS NOT NULL AND (new.response IS NULL OR new.response <> old.response)
BEGIN
    SELECT RAISE(ABORT, 'Reminder response already recorded');
END;
"#;
