use anyhow::{Context, Result};
use chrono::Utc;
use rand::distr::Alphanumeric;
use rand::Rng;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

use tombola_core::FairnessConfig;

use crate::models::{
    Donation, DonorRow, Entry, Giveaway, GiveawayStatus, LeaderboardRow, PlatformStats, Task, User,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id             TEXT PRIMARY KEY,
    email          TEXT NOT NULL UNIQUE,
    display_name   TEXT NOT NULL,
    points         INTEGER NOT NULL DEFAULT 0,
    referral_code  TEXT NOT NULL UNIQUE,
    referred_by    TEXT,
    is_anonymous   INTEGER NOT NULL DEFAULT 0,
    created_at     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS giveaways (
    id                 TEXT PRIMARY KEY,
    title              TEXT NOT NULL,
    description        TEXT NOT NULL,
    prize_description  TEXT NOT NULL,
    end_date           TEXT NOT NULL,
    status             TEXT NOT NULL DEFAULT 'active',
    max_entries        INTEGER,
    entry_count        INTEGER NOT NULL DEFAULT 0,
    winner_id          TEXT,
    created_at         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tasks (
    id           TEXT PRIMARY KEY,
    giveaway_id  TEXT NOT NULL REFERENCES giveaways(id),
    title        TEXT NOT NULL,
    kind         TEXT NOT NULL,
    points       INTEGER NOT NULL,
    position     INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS entries (
    id           TEXT PRIMARY KEY,
    user_id      TEXT NOT NULL REFERENCES users(id),
    giveaway_id  TEXT NOT NULL REFERENCES giveaways(id),
    tickets      INTEGER NOT NULL DEFAULT 1,
    probability  REAL NOT NULL DEFAULT 0.0,
    joined_at    TEXT NOT NULL,
    UNIQUE (user_id, giveaway_id)
);

CREATE TABLE IF NOT EXISTS task_completions (
    id            TEXT PRIMARY KEY,
    user_id       TEXT NOT NULL REFERENCES users(id),
    task_id       TEXT NOT NULL REFERENCES tasks(id),
    giveaway_id   TEXT NOT NULL REFERENCES giveaways(id),
    completed_at  TEXT NOT NULL,
    UNIQUE (user_id, task_id)
);

CREATE TABLE IF NOT EXISTS referrals (
    id               TEXT PRIMARY KEY,
    referrer_id      TEXT NOT NULL REFERENCES users(id),
    referred_user_id TEXT NOT NULL REFERENCES users(id),
    points_awarded   INTEGER NOT NULL,
    created_at       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS donations (
    id              TEXT PRIMARY KEY,
    user_id         TEXT REFERENCES users(id),
    donor_name      TEXT NOT NULL,
    amount          REAL NOT NULL,
    currency        TEXT NOT NULL DEFAULT 'EUR',
    payment_status  TEXT NOT NULL,
    is_anonymous    INTEGER NOT NULL DEFAULT 0,
    message         TEXT,
    created_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS settings (
    id          TEXT PRIMARY KEY,
    fairness    TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
";

pub fn db_path() -> std::path::PathBuf {
    let mut path = std::env::current_dir().unwrap_or_default();
    path.push("data");
    path.push("tombola.db");
    path
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Impossible de créer le répertoire {:?}", parent))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("Impossible d'ouvrir la base {:?}", path))?;
    Ok(conn)
}

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA).context("Échec de la migration")?;

    // Ligne de réglages unique, créée avec la configuration par défaut.
    let fairness = serde_json::to_string(&FairnessConfig::default())?;
    conn.execute(
        "INSERT OR IGNORE INTO settings (id, fairness, updated_at) VALUES ('settings', ?1, ?2)",
        rusqlite::params![fairness, now()],
    )
    .context("Échec de l'initialisation des réglages")?;
    Ok(())
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn new_id() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(16)
        .map(char::from)
        .collect::<String>()
        .to_lowercase()
}

fn new_referral_code() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(8)
        .map(char::from)
        .collect::<String>()
        .to_uppercase()
}

// ── Réglages ──

pub fn get_fairness_config(conn: &Connection) -> Result<FairnessConfig> {
    let json: String = conn
        .query_row("SELECT fairness FROM settings WHERE id = 'settings'", [], |row| row.get(0))
        .context("Réglages introuvables (base non migrée ?)")?;
    let config: FairnessConfig =
        serde_json::from_str(&json).context("Configuration d'équité illisible")?;
    Ok(config)
}

pub fn set_fairness_config(conn: &Connection, config: &FairnessConfig) -> Result<()> {
    let json = serde_json::to_string(config)?;
    conn.execute(
        "UPDATE settings SET fairness = ?1, updated_at = ?2 WHERE id = 'settings'",
        rusqlite::params![json, now()],
    )
    .context("Échec de la mise à jour des réglages")?;
    Ok(())
}

// ── Utilisateurs ──

pub fn create_user(
    conn: &Connection,
    email: &str,
    display_name: &str,
    referred_by: Option<&str>,
) -> Result<User> {
    let user = User {
        id: new_id(),
        email: email.to_string(),
        display_name: display_name.to_string(),
        points: 0,
        referral_code: new_referral_code(),
        referred_by: referred_by.map(|s| s.to_string()),
        is_anonymous: false,
        created_at: now(),
    };
    conn.execute(
        "INSERT INTO users (id, email, display_name, points, referral_code, referred_by, is_anonymous, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            user.id,
            user.email,
            user.display_name,
            user.points,
            user.referral_code,
            user.referred_by,
            user.is_anonymous,
            user.created_at,
        ],
    )
    .context("Échec de la création de l'utilisateur")?;
    Ok(user)
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        display_name: row.get(2)?,
        points: row.get(3)?,
        referral_code: row.get(4)?,
        referred_by: row.get(5)?,
        is_anonymous: row.get(6)?,
        created_at: row.get(7)?,
    })
}

const USER_COLS: &str =
    "id, email, display_name, points, referral_code, referred_by, is_anonymous, created_at";

pub fn get_user(conn: &Connection, id: &str) -> Result<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLS} FROM users WHERE id = ?1"),
            [id],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

pub fn get_user_by_email(conn: &Connection, email: &str) -> Result<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLS} FROM users WHERE email = ?1"),
            [email],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

pub fn get_user_by_referral_code(conn: &Connection, code: &str) -> Result<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLS} FROM users WHERE referral_code = ?1"),
            [code],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

pub fn add_points(conn: &Connection, user_id: &str, points: u32) -> Result<()> {
    let changed = conn.execute(
        "UPDATE users SET points = points + ?1 WHERE id = ?2",
        rusqlite::params![points, user_id],
    )?;
    anyhow::ensure!(changed > 0, "Utilisateur inconnu : {}", user_id);
    Ok(())
}

/// Bascule l'affichage anonyme : le nom est masqué dans les classements
/// et la liste des gagnants.
pub fn set_user_anonymous(conn: &Connection, user_id: &str, is_anonymous: bool) -> Result<()> {
    let changed = conn.execute(
        "UPDATE users SET is_anonymous = ?1 WHERE id = ?2",
        rusqlite::params![is_anonymous, user_id],
    )?;
    anyhow::ensure!(changed > 0, "Utilisateur inconnu : {}", user_id);
    Ok(())
}

// ── Tombolas ──

pub fn create_giveaway(
    conn: &Connection,
    title: &str,
    description: &str,
    prize_description: &str,
    end_date: &str,
    max_entries: Option<u32>,
) -> Result<Giveaway> {
    let giveaway = Giveaway {
        id: new_id(),
        title: title.to_string(),
        description: description.to_string(),
        prize_description: prize_description.to_string(),
        end_date: end_date.to_string(),
        status: GiveawayStatus::Active,
        max_entries,
        entry_count: 0,
        winner_id: None,
        created_at: now(),
    };
    conn.execute(
        "INSERT INTO giveaways (id, title, description, prize_description, end_date, status, max_entries, entry_count, winner_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        rusqlite::params![
            giveaway.id,
            giveaway.title,
            giveaway.description,
            giveaway.prize_description,
            giveaway.end_date,
            giveaway.status.as_str(),
            giveaway.max_entries,
            giveaway.entry_count,
            giveaway.winner_id,
            giveaway.created_at,
        ],
    )
    .context("Échec de la création de la tombola")?;
    Ok(giveaway)
}

fn giveaway_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Giveaway> {
    let status_str: String = row.get(5)?;
    let status = GiveawayStatus::parse(&status_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, e.into())
    })?;
    Ok(Giveaway {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        prize_description: row.get(3)?,
        end_date: row.get(4)?,
        status,
        max_entries: row.get(6)?,
        entry_count: row.get(7)?,
        winner_id: row.get(8)?,
        created_at: row.get(9)?,
    })
}

const GIVEAWAY_COLS: &str = "id, title, description, prize_description, end_date, status, max_entries, entry_count, winner_id, created_at";

pub fn get_giveaway(conn: &Connection, id: &str) -> Result<Option<Giveaway>> {
    let giveaway = conn
        .query_row(
            &format!("SELECT {GIVEAWAY_COLS} FROM giveaways WHERE id = ?1"),
            [id],
            giveaway_from_row,
        )
        .optional()?;
    Ok(giveaway)
}

pub fn list_giveaways(conn: &Connection, status: Option<GiveawayStatus>) -> Result<Vec<Giveaway>> {
    match status {
        Some(s) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {GIVEAWAY_COLS} FROM giveaways WHERE status = ?1 ORDER BY created_at DESC"
            ))?;
            let rows = stmt
                .query_map([s.as_str()], giveaway_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {GIVEAWAY_COLS} FROM giveaways ORDER BY created_at DESC"
            ))?;
            let rows = stmt
                .query_map([], giveaway_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        }
    }
}

pub fn increment_entry_count(conn: &Connection, giveaway_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE giveaways SET entry_count = entry_count + 1 WHERE id = ?1",
        [giveaway_id],
    )?;
    Ok(())
}

/// Enregistre le gagnant et clôt la tombola, sous garde : l'UPDATE ne passe
/// que si aucun gagnant n'existe encore. Retourne false si un tirage
/// concurrent a déjà commité le sien.
pub fn set_winner(conn: &Connection, giveaway_id: &str, winner_id: &str) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE giveaways SET winner_id = ?1, status = 'ended'
         WHERE id = ?2 AND winner_id IS NULL",
        rusqlite::params![winner_id, giveaway_id],
    )?;
    Ok(changed > 0)
}

pub fn delete_giveaway(conn: &Connection, id: &str) -> Result<()> {
    conn.execute("DELETE FROM entries WHERE giveaway_id = ?1", [id])?;
    conn.execute("DELETE FROM task_completions WHERE giveaway_id = ?1", [id])?;
    conn.execute("DELETE FROM tasks WHERE giveaway_id = ?1", [id])?;
    conn.execute("DELETE FROM giveaways WHERE id = ?1", [id])?;
    Ok(())
}

// ── Missions ──

pub fn create_task(
    conn: &Connection,
    giveaway_id: &str,
    title: &str,
    kind: &str,
    points: u32,
    position: u32,
) -> Result<Task> {
    let task = Task {
        id: new_id(),
        giveaway_id: giveaway_id.to_string(),
        title: title.to_string(),
        kind: kind.to_string(),
        points,
        position,
    };
    conn.execute(
        "INSERT INTO tasks (id, giveaway_id, title, kind, points, position)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![task.id, task.giveaway_id, task.title, task.kind, task.points, task.position],
    )
    .context("Échec de la création de la mission")?;
    Ok(task)
}

fn task_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        giveaway_id: row.get(1)?,
        title: row.get(2)?,
        kind: row.get(3)?,
        points: row.get(4)?,
        position: row.get(5)?,
    })
}

pub fn get_task(conn: &Connection, id: &str) -> Result<Option<Task>> {
    let task = conn
        .query_row(
            "SELECT id, giveaway_id, title, kind, points, position FROM tasks WHERE id = ?1",
            [id],
            task_from_row,
        )
        .optional()?;
    Ok(task)
}

pub fn tasks_by_giveaway(conn: &Connection, giveaway_id: &str) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare(
        "SELECT id, giveaway_id, title, kind, points, position
         FROM tasks WHERE giveaway_id = ?1 ORDER BY position",
    )?;
    let tasks = stmt
        .query_map([giveaway_id], task_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tasks)
}

// ── Participations ──

pub fn create_entry(conn: &Connection, user_id: &str, giveaway_id: &str) -> Result<Entry> {
    let entry = Entry {
        id: new_id(),
        user_id: user_id.to_string(),
        giveaway_id: giveaway_id.to_string(),
        tickets: 1,
        probability: 0.0,
        joined_at: now(),
    };
    conn.execute(
        "INSERT INTO entries (id, user_id, giveaway_id, tickets, probability, joined_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            entry.id,
            entry.user_id,
            entry.giveaway_id,
            entry.tickets,
            entry.probability,
            entry.joined_at,
        ],
    )
    .context("Échec de la participation")?;
    Ok(entry)
}

fn entry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Entry> {
    Ok(Entry {
        id: row.get(0)?,
        user_id: row.get(1)?,
        giveaway_id: row.get(2)?,
        tickets: row.get(3)?,
        probability: row.get(4)?,
        joined_at: row.get(5)?,
    })
}

pub fn get_entry(conn: &Connection, user_id: &str, giveaway_id: &str) -> Result<Option<Entry>> {
    let entry = conn
        .query_row(
            "SELECT id, user_id, giveaway_id, tickets, probability, joined_at
             FROM entries WHERE user_id = ?1 AND giveaway_id = ?2",
            [user_id, giveaway_id],
            entry_from_row,
        )
        .optional()?;
    Ok(entry)
}

/// Participations d'une tombola dans l'ordre stable d'enregistrement : le
/// tirage pondéré parcourt cette liste telle quelle.
pub fn entries_for_giveaway(conn: &Connection, giveaway_id: &str) -> Result<Vec<Entry>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, giveaway_id, tickets, probability, joined_at
         FROM entries WHERE giveaway_id = ?1 ORDER BY joined_at, id",
    )?;
    let entries = stmt
        .query_map([giveaway_id], entry_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

pub fn entries_for_user(conn: &Connection, user_id: &str) -> Result<Vec<Entry>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, giveaway_id, tickets, probability, joined_at
         FROM entries WHERE user_id = ?1 ORDER BY joined_at, id",
    )?;
    let entries = stmt
        .query_map([user_id], entry_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

pub fn update_entry_tickets(
    conn: &Connection,
    entry_id: &str,
    tickets: u32,
    probability: f64,
) -> Result<()> {
    conn.execute(
        "UPDATE entries SET tickets = ?1, probability = ?2 WHERE id = ?3",
        rusqlite::params![tickets, probability, entry_id],
    )?;
    Ok(())
}

// ── Accomplissements de missions ──

pub fn has_completed_task(conn: &Connection, user_id: &str, task_id: &str) -> Result<bool> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM task_completions WHERE user_id = ?1 AND task_id = ?2",
        [user_id, task_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn create_completion(
    conn: &Connection,
    user_id: &str,
    task_id: &str,
    giveaway_id: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO task_completions (id, user_id, task_id, giveaway_id, completed_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![new_id(), user_id, task_id, giveaway_id, now()],
    )
    .context("Mission déjà accomplie par cet utilisateur")?;
    Ok(())
}

// ── Parrainages ──

pub fn create_referral(
    conn: &Connection,
    referrer_id: &str,
    referred_user_id: &str,
    points_awarded: u32,
) -> Result<()> {
    conn.execute(
        "INSERT INTO referrals (id, referrer_id, referred_user_id, points_awarded, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![new_id(), referrer_id, referred_user_id, points_awarded, now()],
    )
    .context("Échec de l'enregistrement du parrainage")?;
    Ok(())
}

pub fn referral_count(conn: &Connection, referrer_id: &str) -> Result<u32> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM referrals WHERE referrer_id = ?1",
        [referrer_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

// ── Dons ──

pub fn create_donation(
    conn: &Connection,
    user_id: Option<&str>,
    donor_name: &str,
    amount: f64,
    is_anonymous: bool,
    message: Option<&str>,
) -> Result<Donation> {
    let donation = Donation {
        id: new_id(),
        user_id: user_id.map(|s| s.to_string()),
        donor_name: donor_name.to_string(),
        amount,
        currency: "EUR".to_string(),
        // Pas de passerelle de paiement ici : le statut est posé par
        // l'orchestration appelante.
        payment_status: "success".to_string(),
        is_anonymous,
        message: message.map(|s| s.to_string()),
        created_at: now(),
    };
    conn.execute(
        "INSERT INTO donations (id, user_id, donor_name, amount, currency, payment_status, is_anonymous, message, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
            donation.id,
            donation.user_id,
            donation.donor_name,
            donation.amount,
            donation.currency,
            donation.payment_status,
            donation.is_anonymous,
            donation.message,
            donation.created_at,
        ],
    )
    .context("Échec de l'enregistrement du don")?;
    Ok(donation)
}

/// Classement des donateurs (paiements réussis uniquement), agrégé par
/// donateur. `since` restreint à une fenêtre (classement mensuel).
pub fn donor_leaderboard(conn: &Connection, since: Option<&str>) -> Result<Vec<DonorRow>> {
    let sql = format!(
        "SELECT COALESCE(u.display_name, d.donor_name), MAX(d.is_anonymous), SUM(d.amount), COUNT(*)
         FROM donations d LEFT JOIN users u ON u.id = d.user_id
         WHERE d.payment_status = 'success'{}
         GROUP BY COALESCE(d.user_id, d.donor_name)
         ORDER BY SUM(d.amount) DESC",
        if since.is_some() { " AND d.created_at >= ?1" } else { "" }
    );
    let mut stmt = conn.prepare(&sql)?;
    let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<DonorRow> {
        Ok(DonorRow {
            display_name: row.get(0)?,
            is_anonymous: row.get::<_, i64>(1)? != 0,
            total_amount: row.get(2)?,
            donation_count: row.get(3)?,
        })
    };
    let rows = match since {
        Some(s) => stmt.query_map([s], map_row)?.collect::<Result<Vec<_>, _>>()?,
        None => stmt.query_map([], map_row)?.collect::<Result<Vec<_>, _>>()?,
    };
    Ok(rows)
}

// ── Classements et statistiques ──

pub fn giveaway_leaderboard(conn: &Connection, giveaway_id: &str) -> Result<Vec<LeaderboardRow>> {
    let mut stmt = conn.prepare(
        "SELECT u.id, u.display_name, u.is_anonymous, e.tickets, e.probability
         FROM entries e JOIN users u ON u.id = e.user_id
         WHERE e.giveaway_id = ?1
         ORDER BY e.tickets DESC",
    )?;
    let rows = stmt
        .query_map([giveaway_id], |row| {
            Ok(LeaderboardRow {
                user_id: row.get(0)?,
                display_name: row.get(1)?,
                is_anonymous: row.get(2)?,
                tickets: row.get(3)?,
                probability: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn winners(conn: &Connection) -> Result<Vec<(Giveaway, User)>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {GIVEAWAY_COLS} FROM giveaways WHERE winner_id IS NOT NULL ORDER BY created_at DESC"
    ))?;
    let giveaways = stmt
        .query_map([], giveaway_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    let mut result = Vec::with_capacity(giveaways.len());
    for giveaway in giveaways {
        let winner_id = giveaway.winner_id.clone().unwrap_or_default();
        if let Some(user) = get_user(conn, &winner_id)? {
            result.push((giveaway, user));
        }
    }
    Ok(result)
}

pub fn platform_stats(conn: &Connection) -> Result<PlatformStats> {
    let active_giveaways: u32 = conn.query_row(
        "SELECT COUNT(*) FROM giveaways WHERE status = 'active'",
        [],
        |row| row.get(0),
    )?;
    let total_winners: u32 = conn.query_row(
        "SELECT COUNT(*) FROM giveaways WHERE winner_id IS NOT NULL",
        [],
        |row| row.get(0),
    )?;
    let points_distributed: u64 =
        conn.query_row("SELECT COALESCE(SUM(points), 0) FROM users", [], |row| row.get(0))?;

    Ok(PlatformStats {
        active_giveaways,
        total_winners,
        points_distributed,
    })
}
