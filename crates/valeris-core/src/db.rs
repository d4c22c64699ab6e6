// SQLite persistence layer for the journal.

use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::models::{
    BrokerConnection, MentorSession, Notification, Profile, QuizAttempt, SessionStatus,
    Subscription, SupportTicket, TicketStatus, TrackedEvent, Trade, UnknownVariant,
};

/// SQLite-backed persistence for trades, accounts, support, education and
/// key-value settings.
pub struct Database {
    conn: Mutex<Connection>,
}

const TRADE_COLUMNS: &str = "id, user_id, symbol, side, quantity, entry_price, exit_price,
     entry_time, exit_time, fees, setup, notes, broker_ref";

const PROFILE_COLUMNS: &str =
    "id, email, display_name, role, created_at, two_factor_enabled, last_seen_at";

const TICKET_COLUMNS: &str =
    "id, user_id, subject, body, status, priority, created_at, updated_at, resolved_at";

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS trades (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL,
                symbol      TEXT NOT NULL,
                side        TEXT NOT NULL,
                quantity    REAL NOT NULL,
                entry_price REAL NOT NULL,
                exit_price  REAL,
                entry_time  TEXT NOT NULL,
                exit_time   TEXT,
                fees        REAL NOT NULL DEFAULT 0,
                setup       TEXT,
                notes       TEXT,
                broker_ref  TEXT
            );

            CREATE TABLE IF NOT EXISTS profiles (
                id                 TEXT PRIMARY KEY,
                email              TEXT NOT NULL,
                display_name       TEXT NOT NULL,
                role               TEXT NOT NULL DEFAULT 'trader',
                created_at         TEXT NOT NULL,
                two_factor_enabled INTEGER NOT NULL DEFAULT 0,
                two_factor_secret  TEXT,
                backup_codes       TEXT NOT NULL DEFAULT '[]',
                last_seen_at       TEXT
            );

            CREATE TABLE IF NOT EXISTS user_subscriptions (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL,
                plan        TEXT NOT NULL,
                status      TEXT NOT NULL,
                price_cents INTEGER NOT NULL,
                started_at  TEXT NOT NULL,
                canceled_at TEXT
            );

            CREATE TABLE IF NOT EXISTS support_tickets (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL,
                subject     TEXT NOT NULL,
                body        TEXT NOT NULL,
                status      TEXT NOT NULL,
                priority    TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL,
                resolved_at TEXT
            );

            CREATE TABLE IF NOT EXISTS quiz_attempts (
                id           TEXT PRIMARY KEY,
                user_id      TEXT NOT NULL,
                quiz_id      TEXT NOT NULL,
                correct      INTEGER NOT NULL,
                total        INTEGER NOT NULL,
                completed_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS mentor_sessions (
                id               TEXT PRIMARY KEY,
                user_id          TEXT NOT NULL,
                mentor_id        TEXT NOT NULL,
                scheduled_at     TEXT NOT NULL,
                duration_minutes INTEGER NOT NULL,
                status           TEXT NOT NULL,
                topic            TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS notifications (
                id         TEXT PRIMARY KEY,
                user_id    TEXT NOT NULL,
                kind       TEXT NOT NULL,
                message    TEXT NOT NULL,
                read       INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS broker_connections (
                id             TEXT PRIMARY KEY,
                user_id        TEXT NOT NULL,
                broker         TEXT NOT NULL,
                account_id     TEXT NOT NULL,
                access_token   TEXT NOT NULL,
                expires_at     TEXT,
                last_synced_at TEXT
            );

            CREATE TABLE IF NOT EXISTS analytics_events (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                name       TEXT NOT NULL,
                user_id    TEXT,
                properties TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS settings (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )
        .context("failed to create database schema")?;

        // Migration: journals created before broker sync have no broker_ref
        // column. Fails harmlessly with "duplicate column name" otherwise.
        conn.execute_batch("ALTER TABLE trades ADD COLUMN broker_ref TEXT;")
            .ok();

        conn.execute_batch(
            "CREATE INDEX IF NOT EXISTS idx_trades_user_entry ON trades(user_id, entry_time);
             CREATE UNIQUE INDEX IF NOT EXISTS idx_trades_broker_ref ON trades(user_id, broker_ref);
             CREATE INDEX IF NOT EXISTS idx_events_name ON analytics_events(name);",
        )
        .context("failed to create indexes")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock).
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    // ------------------------------------------------------------------
    // Trades
    // ------------------------------------------------------------------

    pub fn insert_trade(&self, trade: &Trade) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            &format!(
                "INSERT INTO trades ({TRADE_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
            ),
            params![
                trade.id,
                trade.user_id,
                trade.symbol,
                trade.side.as_str(),
                trade.quantity,
                trade.entry_price,
                trade.exit_price,
                ts(&trade.entry_time),
                trade.exit_time.as_ref().map(ts),
                trade.fees,
                trade.setup,
                trade.notes,
                trade.broker_ref,
            ],
        )
        .context("failed to insert trade")?;
        Ok(())
    }

    /// Overwrite every editable column of a trade. Returns `false` when no
    /// row with that id belongs to `trade.user_id`.
    pub fn update_trade(&self, trade: &Trade) -> Result<bool> {
        let conn = self.conn();
        let changed = conn
            .execute(
                "UPDATE trades SET
                    symbol = ?3, side = ?4, quantity = ?5, entry_price = ?6,
                    exit_price = ?7, entry_time = ?8, exit_time = ?9, fees = ?10,
                    setup = ?11, notes = ?12
                 WHERE id = ?1 AND user_id = ?2",
                params![
                    trade.id,
                    trade.user_id,
                    trade.symbol,
                    trade.side.as_str(),
                    trade.quantity,
                    trade.entry_price,
                    trade.exit_price,
                    ts(&trade.entry_time),
                    trade.exit_time.as_ref().map(ts),
                    trade.fees,
                    trade.setup,
                    trade.notes,
                ],
            )
            .context("failed to update trade")?;
        Ok(changed > 0)
    }

    pub fn delete_trade(&self, user_id: &str, trade_id: &str) -> Result<bool> {
        let conn = self.conn();
        let changed = conn
            .execute(
                "DELETE FROM trades WHERE id = ?1 AND user_id = ?2",
                params![trade_id, user_id],
            )
            .context("failed to delete trade")?;
        Ok(changed > 0)
    }

    pub fn get_trade(&self, user_id: &str, trade_id: &str) -> Result<Option<Trade>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {TRADE_COLUMNS} FROM trades WHERE id = ?1 AND user_id = ?2"),
            params![trade_id, user_id],
            trade_from_row,
        )
        .optional()
        .context("failed to load trade")
    }

    /// All trades for a user, ordered by entry time.
    pub fn list_trades(&self, user_id: &str) -> Result<Vec<Trade>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {TRADE_COLUMNS} FROM trades WHERE user_id = ?1 ORDER BY entry_time, id"
            ))
            .context("failed to prepare list_trades query")?;

        let trades = stmt
            .query_map(params![user_id], trade_from_row)
            .context("failed to query trades")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map trade rows")?;
        Ok(trades)
    }

    /// Insert a broker-synced trade, or refresh the existing row with the
    /// same `(user_id, broker_ref)`. Returns the stored row's id, which is
    /// the original id when the trade was already present.
    pub fn upsert_trade_by_broker_ref(&self, trade: &Trade) -> Result<String> {
        let broker_ref = trade
            .broker_ref
            .as_deref()
            .context("broker-synced trade has no broker_ref")?;
        let conn = self.conn();
        let id: String = conn
            .query_row(
                &format!(
                    "INSERT INTO trades ({TRADE_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                     ON CONFLICT(user_id, broker_ref) DO UPDATE SET
                        symbol      = excluded.symbol,
                        side        = excluded.side,
                        quantity    = excluded.quantity,
                        entry_price = excluded.entry_price,
                        exit_price  = excluded.exit_price,
                        entry_time  = excluded.entry_time,
                        exit_time   = excluded.exit_time,
                        fees        = excluded.fees
                     RETURNING id"
                ),
                params![
                    trade.id,
                    trade.user_id,
                    trade.symbol,
                    trade.side.as_str(),
                    trade.quantity,
                    trade.entry_price,
                    trade.exit_price,
                    ts(&trade.entry_time),
                    trade.exit_time.as_ref().map(ts),
                    trade.fees,
                    trade.setup,
                    trade.notes,
                    broker_ref,
                ],
                |row| row.get(0),
            )
            .context("failed to upsert broker trade")?;
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Profiles and two-factor state
    // ------------------------------------------------------------------

    /// Insert or update a profile. Two-factor columns are left untouched on
    /// update; use [`Database::set_two_factor`] for those.
    pub fn upsert_profile(&self, profile: &Profile) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO profiles (id, email, display_name, role, created_at, last_seen_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                email        = excluded.email,
                display_name = excluded.display_name,
                role         = excluded.role,
                last_seen_at = excluded.last_seen_at",
            params![
                profile.id,
                profile.email,
                profile.display_name,
                profile.role.as_str(),
                ts(&profile.created_at),
                profile.last_seen_at.as_ref().map(ts),
            ],
        )
        .context("failed to upsert profile")?;
        Ok(())
    }

    pub fn get_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = ?1"),
            params![user_id],
            profile_from_row,
        )
        .optional()
        .context("failed to load profile")
    }

    pub fn list_profiles(&self) -> Result<Vec<Profile>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {PROFILE_COLUMNS} FROM profiles ORDER BY created_at, id"
            ))
            .context("failed to prepare list_profiles query")?;
        let profiles = stmt
            .query_map([], profile_from_row)
            .context("failed to query profiles")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map profile rows")?;
        Ok(profiles)
    }

    /// Store (or clear) a user's TOTP secret and backup codes. Returns
    /// `false` when the profile does not exist.
    pub fn set_two_factor(
        &self,
        user_id: &str,
        enabled: bool,
        secret: Option<&str>,
        backup_codes: &[String],
    ) -> Result<bool> {
        let codes_json =
            serde_json::to_string(backup_codes).context("failed to serialize backup codes")?;
        let conn = self.conn();
        let changed = conn
            .execute(
                "UPDATE profiles SET two_factor_enabled = ?2, two_factor_secret = ?3, backup_codes = ?4
                 WHERE id = ?1",
                params![user_id, enabled, secret, codes_json],
            )
            .context("failed to update two-factor settings")?;
        Ok(changed > 0)
    }

    /// Turn on two-factor for a user who has already enrolled a secret.
    pub fn enable_two_factor(&self, user_id: &str) -> Result<bool> {
        let conn = self.conn();
        let changed = conn
            .execute(
                "UPDATE profiles SET two_factor_enabled = 1
                 WHERE id = ?1 AND two_factor_secret IS NOT NULL",
                params![user_id],
            )
            .context("failed to enable two-factor")?;
        Ok(changed > 0)
    }

    pub fn two_factor_secret(&self, user_id: &str) -> Result<Option<String>> {
        let conn = self.conn();
        let secret: Option<Option<String>> = conn
            .query_row(
                "SELECT two_factor_secret FROM profiles WHERE id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()
            .context("failed to load two-factor secret")?;
        Ok(secret.flatten())
    }

    /// Remove `code` from the user's remaining backup codes. Returns `true`
    /// if the code was present. Comparison ignores case and dashes.
    pub fn consume_backup_code(&self, user_id: &str, code: &str) -> Result<bool> {
        let wanted = normalize_backup_code(code);
        if wanted.is_empty() {
            return Ok(false);
        }

        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin transaction")?;
        let stored: Option<String> = tx
            .query_row(
                "SELECT backup_codes FROM profiles WHERE id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()
            .context("failed to load backup codes")?;
        let Some(stored) = stored else {
            return Ok(false);
        };

        let mut codes: Vec<String> =
            serde_json::from_str(&stored).context("failed to parse backup codes")?;
        let Some(pos) = codes
            .iter()
            .position(|c| normalize_backup_code(c) == wanted)
        else {
            return Ok(false);
        };
        codes.remove(pos);

        let codes_json =
            serde_json::to_string(&codes).context("failed to serialize backup codes")?;
        tx.execute(
            "UPDATE profiles SET backup_codes = ?2 WHERE id = ?1",
            params![user_id, codes_json],
        )
        .context("failed to store backup codes")?;
        tx.commit().context("failed to commit backup code use")?;
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------

    pub fn upsert_subscription(&self, sub: &Subscription) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO user_subscriptions (id, user_id, plan, status, price_cents, started_at, canceled_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                plan        = excluded.plan,
                status      = excluded.status,
                price_cents = excluded.price_cents,
                canceled_at = excluded.canceled_at",
            params![
                sub.id,
                sub.user_id,
                sub.plan.as_str(),
                sub.status.as_str(),
                sub.price_cents,
                ts(&sub.started_at),
                sub.canceled_at.as_ref().map(ts),
            ],
        )
        .context("failed to upsert subscription")?;
        Ok(())
    }

    pub fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, plan, status, price_cents, started_at, canceled_at
                 FROM user_subscriptions ORDER BY started_at, id",
            )
            .context("failed to prepare list_subscriptions query")?;
        let subs = stmt
            .query_map([], |row| {
                Ok(Subscription {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    plan: parse_enum(row, 2)?,
                    status: parse_enum(row, 3)?,
                    price_cents: row.get(4)?,
                    started_at: parse_time(row, 5)?,
                    canceled_at: parse_opt_time(row, 6)?,
                })
            })
            .context("failed to query subscriptions")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map subscription rows")?;
        Ok(subs)
    }

    // ------------------------------------------------------------------
    // Support tickets
    // ------------------------------------------------------------------

    pub fn insert_ticket(&self, ticket: &SupportTicket) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            &format!(
                "INSERT INTO support_tickets ({TICKET_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
            ),
            params![
                ticket.id,
                ticket.user_id,
                ticket.subject,
                ticket.body,
                ticket.status.as_str(),
                ticket.priority.as_str(),
                ts(&ticket.created_at),
                ts(&ticket.updated_at),
                ticket.resolved_at.as_ref().map(ts),
            ],
        )
        .context("failed to insert support ticket")?;
        Ok(())
    }

    /// Move a ticket to `status` if the transition is allowed. Sets
    /// `resolved_at` when the ticket becomes resolved and clears it on
    /// reopen. Returns `false` for an unknown ticket or a rejected
    /// transition.
    pub fn update_ticket_status(
        &self,
        ticket_id: &str,
        status: TicketStatus,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin transaction")?;
        let current: Option<TicketStatus> = tx
            .query_row(
                "SELECT status FROM support_tickets WHERE id = ?1",
                params![ticket_id],
                |row| parse_enum(row, 0),
            )
            .optional()
            .context("failed to load ticket status")?;

        match current {
            Some(from) if from.can_transition(status) => {}
            _ => return Ok(false),
        }

        let resolved_sql = match status {
            TicketStatus::Resolved => "?3",
            TicketStatus::Open | TicketStatus::InProgress => "NULL",
            TicketStatus::Closed => "resolved_at",
        };
        tx.execute(
            &format!(
                "UPDATE support_tickets SET status = ?2, updated_at = ?3, resolved_at = {resolved_sql}
                 WHERE id = ?1"
            ),
            params![ticket_id, status.as_str(), ts(&now)],
        )
        .context("failed to update ticket status")?;
        tx.commit().context("failed to commit ticket status")?;
        Ok(true)
    }

    /// Tickets for one user, or every ticket when `user_id` is `None`.
    /// Newest first.
    pub fn list_tickets(&self, user_id: Option<&str>) -> Result<Vec<SupportTicket>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {TICKET_COLUMNS} FROM support_tickets
                 WHERE ?1 IS NULL OR user_id = ?1
                 ORDER BY created_at DESC, id"
            ))
            .context("failed to prepare list_tickets query")?;
        let tickets = stmt
            .query_map(params![user_id], |row| {
                Ok(SupportTicket {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    subject: row.get(2)?,
                    body: row.get(3)?,
                    status: parse_enum(row, 4)?,
                    priority: parse_enum(row, 5)?,
                    created_at: parse_time(row, 6)?,
                    updated_at: parse_time(row, 7)?,
                    resolved_at: parse_opt_time(row, 8)?,
                })
            })
            .context("failed to query support tickets")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map support ticket rows")?;
        Ok(tickets)
    }

    // ------------------------------------------------------------------
    // Quizzes and mentor sessions
    // ------------------------------------------------------------------

    pub fn insert_quiz_attempt(&self, attempt: &QuizAttempt) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO quiz_attempts (id, user_id, quiz_id, correct, total, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                attempt.id,
                attempt.user_id,
                attempt.quiz_id,
                attempt.correct,
                attempt.total,
                ts(&attempt.completed_at),
            ],
        )
        .context("failed to insert quiz attempt")?;
        Ok(())
    }

    pub fn list_quiz_attempts(&self, user_id: &str) -> Result<Vec<QuizAttempt>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, quiz_id, correct, total, completed_at
                 FROM quiz_attempts WHERE user_id = ?1 ORDER BY completed_at, id",
            )
            .context("failed to prepare list_quiz_attempts query")?;
        let attempts = stmt
            .query_map(params![user_id], |row| {
                Ok(QuizAttempt {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    quiz_id: row.get(2)?,
                    correct: row.get(3)?,
                    total: row.get(4)?,
                    completed_at: parse_time(row, 5)?,
                })
            })
            .context("failed to query quiz attempts")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map quiz attempt rows")?;
        Ok(attempts)
    }

    pub fn insert_mentor_session(&self, session: &MentorSession) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO mentor_sessions (id, user_id, mentor_id, scheduled_at, duration_minutes, status, topic)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                session.id,
                session.user_id,
                session.mentor_id,
                ts(&session.scheduled_at),
                session.duration_minutes,
                session.status.as_str(),
                session.topic,
            ],
        )
        .context("failed to insert mentor session")?;
        Ok(())
    }

    pub fn update_session_status(
        &self,
        user_id: &str,
        session_id: &str,
        status: SessionStatus,
    ) -> Result<bool> {
        let conn = self.conn();
        let changed = conn
            .execute(
                "UPDATE mentor_sessions SET status = ?3 WHERE id = ?1 AND user_id = ?2",
                params![session_id, user_id, status.as_str()],
            )
            .context("failed to update mentor session")?;
        Ok(changed > 0)
    }

    pub fn list_mentor_sessions(&self, user_id: &str) -> Result<Vec<MentorSession>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, mentor_id, scheduled_at, duration_minutes, status, topic
                 FROM mentor_sessions WHERE user_id = ?1 ORDER BY scheduled_at, id",
            )
            .context("failed to prepare list_mentor_sessions query")?;
        let sessions = stmt
            .query_map(params![user_id], |row| {
                Ok(MentorSession {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    mentor_id: row.get(2)?,
                    scheduled_at: parse_time(row, 3)?,
                    duration_minutes: row.get(4)?,
                    status: parse_enum(row, 5)?,
                    topic: row.get(6)?,
                })
            })
            .context("failed to query mentor sessions")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map mentor session rows")?;
        Ok(sessions)
    }

    // ------------------------------------------------------------------
    // Notifications
    // ------------------------------------------------------------------

    pub fn insert_notification(&self, note: &Notification) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO notifications (id, user_id, kind, message, read, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                note.id,
                note.user_id,
                note.kind,
                note.message,
                note.read,
                ts(&note.created_at),
            ],
        )
        .context("failed to insert notification")?;
        Ok(())
    }

    pub fn mark_notification_read(&self, user_id: &str, notification_id: &str) -> Result<bool> {
        let conn = self.conn();
        let changed = conn
            .execute(
                "UPDATE notifications SET read = 1 WHERE id = ?1 AND user_id = ?2",
                params![notification_id, user_id],
            )
            .context("failed to mark notification read")?;
        Ok(changed > 0)
    }

    /// Newest first.
    pub fn list_notifications(&self, user_id: &str, unread_only: bool) -> Result<Vec<Notification>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, kind, message, read, created_at
                 FROM notifications
                 WHERE user_id = ?1 AND (?2 = 0 OR read = 0)
                 ORDER BY created_at DESC, id",
            )
            .context("failed to prepare list_notifications query")?;
        let notes = stmt
            .query_map(params![user_id, unread_only], |row| {
                Ok(Notification {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    kind: row.get(2)?,
                    message: row.get(3)?,
                    read: row.get(4)?,
                    created_at: parse_time(row, 5)?,
                })
            })
            .context("failed to query notifications")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map notification rows")?;
        Ok(notes)
    }

    // ------------------------------------------------------------------
    // Broker connections
    // ------------------------------------------------------------------

    pub fn upsert_broker_connection(&self, connection: &BrokerConnection) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO broker_connections
                (id, user_id, broker, account_id, access_token, expires_at, last_synced_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                account_id   = excluded.account_id,
                access_token = excluded.access_token,
                expires_at   = excluded.expires_at",
            params![
                connection.id,
                connection.user_id,
                connection.broker.as_str(),
                connection.account_id,
                connection.access_token,
                connection.expires_at.as_ref().map(ts),
                connection.last_synced_at.as_ref().map(ts),
            ],
        )
        .context("failed to upsert broker connection")?;
        Ok(())
    }

    pub fn get_broker_connection(
        &self,
        user_id: &str,
        connection_id: &str,
    ) -> Result<Option<BrokerConnection>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, user_id, broker, account_id, access_token, expires_at, last_synced_at
             FROM broker_connections WHERE id = ?1 AND user_id = ?2",
            params![connection_id, user_id],
            broker_connection_from_row,
        )
        .optional()
        .context("failed to load broker connection")
    }

    pub fn list_broker_connections(&self, user_id: &str) -> Result<Vec<BrokerConnection>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, broker, account_id, access_token, expires_at, last_synced_at
                 FROM broker_connections WHERE user_id = ?1 ORDER BY broker, id",
            )
            .context("failed to prepare list_broker_connections query")?;
        let connections = stmt
            .query_map(params![user_id], broker_connection_from_row)
            .context("failed to query broker connections")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map broker connection rows")?;
        Ok(connections)
    }

    pub fn touch_broker_sync(
        &self,
        user_id: &str,
        connection_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.conn();
        let changed = conn
            .execute(
                "UPDATE broker_connections SET last_synced_at = ?3 WHERE id = ?1 AND user_id = ?2",
                params![connection_id, user_id, ts(&at)],
            )
            .context("failed to touch broker sync time")?;
        Ok(changed > 0)
    }

    // ------------------------------------------------------------------
    // Usage events
    // ------------------------------------------------------------------

    /// Write a batch of tracked events in one transaction.
    pub fn insert_events(&self, events: &[TrackedEvent]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin events transaction")?;
        for event in events {
            let properties = serde_json::to_string(&event.properties)
                .context("failed to serialize event properties")?;
            tx.execute(
                "INSERT INTO analytics_events (name, user_id, properties, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![event.name, event.user_id, properties, ts(&event.created_at)],
            )
            .context("failed to insert event")?;
        }
        tx.commit().context("failed to commit events")?;
        Ok(events.len())
    }

    pub fn count_events(&self, name: &str) -> Result<usize> {
        let conn = self.conn();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM analytics_events WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .context("failed to count events")?;
        Ok(count as usize)
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    /// Persist an arbitrary JSON value under `key`, replacing any prior value.
    pub fn save_setting(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        let conn = self.conn();
        let json_str =
            serde_json::to_string(value).context("failed to serialize setting value")?;
        conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
            params![key, json_str],
        )
        .context("failed to save setting")?;
        Ok(())
    }

    pub fn load_setting(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let conn = self.conn();
        let json_str: Option<String> = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .context("failed to load setting")?;

        match json_str {
            Some(s) => {
                let value = serde_json::from_str(&s)
                    .context("failed to deserialize setting value")?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

/// Timestamps are stored as fixed-width RFC 3339 so text order is time order.
fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_opt_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let text: Option<String> = row.get(idx)?;
    match text {
        None => Ok(None),
        Some(_) => parse_time(row, idx).map(Some),
    }
}

fn parse_enum<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = UnknownVariant>,
{
    let text: String = row.get(idx)?;
    text.parse()
        .map_err(|e: UnknownVariant| {
            rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
        })
}

fn trade_from_row(row: &Row<'_>) -> rusqlite::Result<Trade> {
    Ok(Trade {
        id: row.get(0)?,
        user_id: row.get(1)?,
        symbol: row.get(2)?,
        side: parse_enum(row, 3)?,
        quantity: row.get(4)?,
        entry_price: row.get(5)?,
        exit_price: row.get(6)?,
        entry_time: parse_time(row, 7)?,
        exit_time: parse_opt_time(row, 8)?,
        fees: row.get(9)?,
        setup: row.get(10)?,
        notes: row.get(11)?,
        broker_ref: row.get(12)?,
    })
}

fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<Profile> {
    Ok(Profile {
        id: row.get(0)?,
        email: row.get(1)?,
        display_name: row.get(2)?,
        role: parse_enum(row, 3)?,
        created_at: parse_time(row, 4)?,
        two_factor_enabled: row.get(5)?,
        last_seen_at: parse_opt_time(row, 6)?,
    })
}

fn broker_connection_from_row(row: &Row<'_>) -> rusqlite::Result<BrokerConnection> {
    Ok(BrokerConnection {
        id: row.get(0)?,
        user_id: row.get(1)?,
        broker: parse_enum(row, 2)?,
        account_id: row.get(3)?,
        access_token: row.get(4)?,
        expires_at: parse_opt_time(row, 5)?,
        last_synced_at: parse_opt_time(row, 6)?,
    })
}

fn normalize_backup_code(code: &str) -> String {
    code.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Broker, Plan, Role, Side, SubscriptionStatus, TicketPriority};
    use chrono::{Duration, TimeZone};

    fn test_db() -> Database {
        Database::open(":memory:").expect("in-memory database should open")
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 14, 30, 0).unwrap()
    }

    fn closed_trade(user: &str, symbol: &str, minutes: i64) -> Trade {
        Trade::open(user, symbol, Side::Long, 10.0, 100.0, t0() + Duration::minutes(minutes))
            .closed_at(101.0, t0() + Duration::minutes(minutes + 5))
    }

    fn profile(id: &str) -> Profile {
        Profile {
            id: id.into(),
            email: format!("{id}@example.com"),
            display_name: id.to_uppercase(),
            role: Role::Trader,
            created_at: t0(),
            two_factor_enabled: false,
            last_seen_at: None,
        }
    }

    #[test]
    fn open_creates_schema_and_reopens() {
        let db = test_db();
        assert!(db.list_trades("nobody").unwrap().is_empty());
        assert!(db.list_profiles().unwrap().is_empty());
        assert!(db.load_setting("missing").unwrap().is_none());
    }

    #[test]
    fn trades_round_trip_in_entry_order() {
        let db = test_db();
        let later = closed_trade("u1", "MSFT", 60);
        let mut earlier = closed_trade("u1", "AAPL", 0);
        earlier.setup = Some("breakout".into());
        earlier.fees = 1.5;
        db.insert_trade(&later).unwrap();
        db.insert_trade(&earlier).unwrap();
        db.insert_trade(&closed_trade("u2", "TSLA", 30)).unwrap();

        let trades = db.list_trades("u1").unwrap();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0], earlier);
        assert_eq!(trades[1].symbol, "MSFT");
    }

    #[test]
    fn other_users_rows_are_untouchable() {
        let db = test_db();
        let mut trade = closed_trade("owner", "SPY", 0);
        db.insert_trade(&trade).unwrap();

        assert!(!db.delete_trade("intruder", &trade.id).unwrap());
        assert!(db.get_trade("intruder", &trade.id).unwrap().is_none());

        trade.user_id = "intruder".into();
        trade.notes = Some("mine now".into());
        assert!(!db.update_trade(&trade).unwrap());

        let stored = db.get_trade("owner", &trade.id).unwrap().unwrap();
        assert_eq!(stored.notes, None);
        assert!(db.delete_trade("owner", &trade.id).unwrap());
        assert!(db.list_trades("owner").unwrap().is_empty());
    }

    #[test]
    fn update_trade_closes_an_open_position() {
        let db = test_db();
        let open = Trade::open("u1", "QQQ", Side::Short, 3.0, 400.0, t0());
        db.insert_trade(&open).unwrap();

        let closed = open.clone().closed_at(395.0, t0() + Duration::hours(2));
        assert!(db.update_trade(&closed).unwrap());
        let stored = db.get_trade("u1", &open.id).unwrap().unwrap();
        assert_eq!(stored.pnl(), Some(15.0));
    }

    #[test]
    fn broker_upsert_is_idempotent() {
        let db = test_db();
        let mut first = closed_trade("u1", "NVDA", 0);
        first.broker_ref = Some("ORD-1".into());
        let id = db.upsert_trade_by_broker_ref(&first).unwrap();
        assert_eq!(id, first.id);

        let mut again = closed_trade("u1", "NVDA", 0);
        again.broker_ref = Some("ORD-1".into());
        again.exit_price = Some(110.0);
        let id2 = db.upsert_trade_by_broker_ref(&again).unwrap();
        assert_eq!(id2, first.id);

        let trades = db.list_trades("u1").unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].exit_price, Some(110.0));

        let mut no_ref = closed_trade("u1", "NVDA", 0);
        no_ref.broker_ref = None;
        assert!(db.upsert_trade_by_broker_ref(&no_ref).is_err());
    }

    #[test]
    fn manual_trades_without_broker_ref_do_not_collide() {
        let db = test_db();
        db.insert_trade(&closed_trade("u1", "A", 0)).unwrap();
        db.insert_trade(&closed_trade("u1", "B", 1)).unwrap();
        assert_eq!(db.list_trades("u1").unwrap().len(), 2);
    }

    #[test]
    fn profile_upsert_preserves_two_factor() {
        let db = test_db();
        db.upsert_profile(&profile("u1")).unwrap();
        let codes = vec!["ABCD-EFGH".to_string(), "JKLM-NPQR".to_string()];
        assert!(db.set_two_factor("u1", true, Some("SECRET"), &codes).unwrap());
        assert!(!db.set_two_factor("ghost", true, Some("X"), &codes).unwrap());

        let mut renamed = profile("u1");
        renamed.display_name = "Renamed".into();
        db.upsert_profile(&renamed).unwrap();

        let stored = db.get_profile("u1").unwrap().unwrap();
        assert_eq!(stored.display_name, "Renamed");
        assert!(stored.two_factor_enabled);
        assert_eq!(db.two_factor_secret("u1").unwrap().as_deref(), Some("SECRET"));
        assert_eq!(db.two_factor_secret("ghost").unwrap(), None);
    }

    #[test]
    fn enable_two_factor_requires_enrolled_secret() {
        let db = test_db();
        db.upsert_profile(&profile("u1")).unwrap();
        assert!(!db.enable_two_factor("u1").unwrap());

        db.set_two_factor("u1", false, Some("SECRET"), &[]).unwrap();
        assert!(!db.get_profile("u1").unwrap().unwrap().two_factor_enabled);
        assert!(db.enable_two_factor("u1").unwrap());
        assert!(db.get_profile("u1").unwrap().unwrap().two_factor_enabled);
        assert!(!db.enable_two_factor("ghost").unwrap());
    }

    #[test]
    fn backup_codes_are_single_use() {
        let db = test_db();
        db.upsert_profile(&profile("u1")).unwrap();
        let codes = vec!["ABCD-EFGH".to_string()];
        db.set_two_factor("u1", true, Some("S"), &codes).unwrap();

        assert!(db.consume_backup_code("u1", "abcdefgh").unwrap());
        assert!(!db.consume_backup_code("u1", "ABCD-EFGH").unwrap());
        assert!(!db.consume_backup_code("ghost", "ABCD-EFGH").unwrap());
        assert!(!db.consume_backup_code("u1", "--").unwrap());
    }

    #[test]
    fn ticket_status_transitions_and_resolution_time() {
        let db = test_db();
        let ticket = SupportTicket {
            id: "t1".into(),
            user_id: "u1".into(),
            subject: "Import failed".into(),
            body: "CSV had a bad row".into(),
            status: TicketStatus::Open,
            priority: TicketPriority::High,
            created_at: t0(),
            updated_at: t0(),
            resolved_at: None,
        };
        db.insert_ticket(&ticket).unwrap();

        let later = t0() + Duration::hours(3);
        assert!(db.update_ticket_status("t1", TicketStatus::Resolved, later).unwrap());
        assert!(!db.update_ticket_status("t1", TicketStatus::InProgress, later).unwrap());
        assert!(!db.update_ticket_status("missing", TicketStatus::Closed, later).unwrap());

        let tickets = db.list_tickets(Some("u1")).unwrap();
        assert_eq!(tickets[0].status, TicketStatus::Resolved);
        assert_eq!(tickets[0].resolved_at, Some(later));

        assert!(db.update_ticket_status("t1", TicketStatus::Open, later).unwrap());
        let reopened = &db.list_tickets(None).unwrap()[0];
        assert_eq!(reopened.resolved_at, None);
        assert!(db.list_tickets(Some("u2")).unwrap().is_empty());
    }

    #[test]
    fn subscriptions_upsert_by_id() {
        let db = test_db();
        let mut sub = Subscription {
            id: "s1".into(),
            user_id: "u1".into(),
            plan: Plan::Pro,
            status: SubscriptionStatus::Active,
            price_cents: 2900,
            started_at: t0(),
            canceled_at: None,
        };
        db.upsert_subscription(&sub).unwrap();
        sub.status = SubscriptionStatus::Canceled;
        sub.canceled_at = Some(t0() + Duration::days(10));
        db.upsert_subscription(&sub).unwrap();

        let subs = db.list_subscriptions().unwrap();
        assert_eq!(subs, vec![sub]);
    }

    #[test]
    fn notifications_unread_filter() {
        let db = test_db();
        for (i, id) in ["n1", "n2"].iter().enumerate() {
            db.insert_notification(&Notification {
                id: (*id).into(),
                user_id: "u1".into(),
                kind: "system".into(),
                message: format!("message {i}"),
                read: false,
                created_at: t0() + Duration::minutes(i as i64),
            })
            .unwrap();
        }
        assert!(db.mark_notification_read("u1", "n1").unwrap());
        assert!(!db.mark_notification_read("u2", "n2").unwrap());

        let all = db.list_notifications("u1", false).unwrap();
        assert_eq!(all.iter().map(|n| n.id.as_str()).collect::<Vec<_>>(), ["n2", "n1"]);
        let unread = db.list_notifications("u1", true).unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].id, "n2");
    }

    #[test]
    fn quiz_attempts_and_mentor_sessions() {
        let db = test_db();
        db.insert_quiz_attempt(&QuizAttempt {
            id: "q1".into(),
            user_id: "u1".into(),
            quiz_id: "risk-101".into(),
            correct: 8,
            total: 10,
            completed_at: t0(),
        })
        .unwrap();
        assert_eq!(db.list_quiz_attempts("u1").unwrap()[0].correct, 8);

        db.insert_mentor_session(&MentorSession {
            id: "m1".into(),
            user_id: "u1".into(),
            mentor_id: "mentor".into(),
            scheduled_at: t0(),
            duration_minutes: 45,
            status: SessionStatus::Booked,
            topic: "Position sizing".into(),
        })
        .unwrap();
        assert!(!db.update_session_status("u2", "m1", SessionStatus::Cancelled).unwrap());
        assert!(db.update_session_status("u1", "m1", SessionStatus::Completed).unwrap());
        assert_eq!(
            db.list_mentor_sessions("u1").unwrap()[0].status,
            SessionStatus::Completed
        );
    }

    #[test]
    fn broker_connections_scoped_and_touched() {
        let db = test_db();
        let connection = BrokerConnection {
            id: "c1".into(),
            user_id: "u1".into(),
            broker: Broker::Etrade,
            account_id: "ACC".into(),
            access_token: "token".into(),
            expires_at: None,
            last_synced_at: None,
        };
        db.upsert_broker_connection(&connection).unwrap();
        assert!(db.get_broker_connection("u2", "c1").unwrap().is_none());

        assert!(db.touch_broker_sync("u1", "c1", t0()).unwrap());
        let stored = db.get_broker_connection("u1", "c1").unwrap().unwrap();
        assert_eq!(stored.last_synced_at, Some(t0()));
        assert_eq!(db.list_broker_connections("u1").unwrap().len(), 1);
    }

    #[test]
    fn events_and_settings() {
        let db = test_db();
        let event = TrackedEvent {
            name: "trade_added".into(),
            user_id: Some("u1".into()),
            properties: serde_json::json!({ "symbol": "AAPL" }),
            created_at: t0(),
        };
        assert_eq!(db.insert_events(&[event.clone(), event]).unwrap(), 2);
        assert_eq!(db.count_events("trade_added").unwrap(), 2);
        assert_eq!(db.count_events("other").unwrap(), 0);

        db.save_setting("range", &serde_json::json!("7d")).unwrap();
        db.save_setting("range", &serde_json::json!("all")).unwrap();
        assert_eq!(db.load_setting("range").unwrap(), Some(serde_json::json!("all")));
    }
}
