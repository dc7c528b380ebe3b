use anyhow::{bail, Context, Result};
use rand::Rng;

use tombola_core::{compute_tickets, select_winner, select_winner_seeded, Entrant, EntryWeight};
use tombola_db::db::{
    add_points, create_completion, create_entry, create_referral, create_user, entries_for_giveaway,
    entries_for_user, get_entry, get_fairness_config, get_giveaway, get_task, get_user,
    get_user_by_referral_code, has_completed_task, increment_entry_count, referral_count,
    set_winner, update_entry_tickets,
};
use tombola_db::models::{GiveawayStatus, User};
use tombola_db::rusqlite::Connection;

/// Recalcule tickets et probabilités pour tous les participants d'une
/// tombola et les persiste par participation, dans une seule transaction.
///
/// Le calcul est global (médiane et total dépendent de tout l'ensemble) :
/// chaque événement qui touche points ou parrainages repasse ici. La
/// transaction sérialise les écritures d'un recalcul : deux recalculs qui
/// se suivent convergent vers l'état le plus récent.
pub fn recompute_probabilities(conn: &Connection, giveaway_id: &str) -> Result<usize> {
    let config = get_fairness_config(conn)?;
    let entries = entries_for_giveaway(conn, giveaway_id)?;

    let mut entrants = Vec::with_capacity(entries.len());
    for entry in &entries {
        let user = get_user(conn, &entry.user_id)?
            .with_context(|| format!("Participant sans utilisateur : {}", entry.user_id))?;
        entrants.push(Entrant {
            user_id: user.id,
            entry_id: entry.id.clone(),
            points: user.points,
            referrals: referral_count(conn, &entry.user_id)?,
        });
    }

    let results = compute_tickets(&entrants, &config)?;

    let tx = conn
        .unchecked_transaction()
        .context("Impossible de démarrer la transaction")?;
    for result in &results {
        update_entry_tickets(&tx, &result.entry_id, result.tickets, result.probability)?;
    }
    tx.commit().context("Échec du commit du recalcul")?;
    Ok(results.len())
}

/// Inscription d'un utilisateur, avec parrainage optionnel : le code du
/// parrain crédite ses points et déclenche le recalcul de toutes les
/// tombolas où il participe (son compteur de parrainages les nourrit
/// toutes).
pub fn signup(
    conn: &Connection,
    email: &str,
    display_name: &str,
    referral_code: Option<&str>,
    referral_points: u32,
) -> Result<User> {
    let referrer = match referral_code {
        Some(code) => Some(
            get_user_by_referral_code(conn, code)?
                .with_context(|| format!("Code de parrainage inconnu : {}", code))?,
        ),
        None => None,
    };

    let user = create_user(conn, email, display_name, referrer.as_ref().map(|r| r.id.as_str()))?;

    if let Some(referrer) = referrer {
        create_referral(conn, &referrer.id, &user.id, referral_points)?;
        add_points(conn, &referrer.id, referral_points)?;
        for entry in entries_for_user(conn, &referrer.id)? {
            recompute_probabilities(conn, &entry.giveaway_id)?;
        }
    }

    Ok(user)
}

pub fn join_giveaway(conn: &Connection, user_id: &str, giveaway_id: &str) -> Result<()> {
    let giveaway = get_giveaway(conn, giveaway_id)?
        .with_context(|| format!("Tombola inconnue : {}", giveaway_id))?;
    if giveaway.status != GiveawayStatus::Active {
        bail!("La tombola '{}' n'est pas active", giveaway.title);
    }
    if let Some(max) = giveaway.max_entries {
        if giveaway.entry_count >= max {
            bail!("La tombola '{}' est complète ({} participations)", giveaway.title, max);
        }
    }
    if get_entry(conn, user_id, giveaway_id)?.is_some() {
        bail!("Participation déjà enregistrée pour cette tombola");
    }

    create_entry(conn, user_id, giveaway_id)?;
    increment_entry_count(conn, giveaway_id)?;
    recompute_probabilities(conn, giveaway_id)?;
    Ok(())
}

/// Accomplissement d'une mission : garde anti-doublon, crédit des points,
/// puis recalcul de la tombola concernée. Retourne les points gagnés.
pub fn complete_task(conn: &Connection, user_id: &str, task_id: &str) -> Result<u32> {
    let task = get_task(conn, task_id)?
        .with_context(|| format!("Mission inconnue : {}", task_id))?;
    if has_completed_task(conn, user_id, task_id)? {
        bail!("Mission '{}' déjà accomplie", task.title);
    }
    if get_entry(conn, user_id, &task.giveaway_id)?.is_none() {
        bail!("Rejoignez d'abord la tombola avant d'accomplir ses missions");
    }

    create_completion(conn, user_id, task_id, &task.giveaway_id)?;
    add_points(conn, user_id, task.points)?;
    recompute_probabilities(conn, &task.giveaway_id)?;
    Ok(task.points)
}

/// Clôture d'une tombola : un tirage pondéré, un seul gagnant, une seule
/// fois. Avec `seed`, le tirage est reproductible pour audit ; sans, il
/// tire du générateur de l'OS.
pub fn close_giveaway(conn: &Connection, giveaway_id: &str, seed: Option<u64>) -> Result<String> {
    let giveaway = get_giveaway(conn, giveaway_id)?
        .with_context(|| format!("Tombola inconnue : {}", giveaway_id))?;
    if giveaway.winner_id.is_some() {
        bail!("La tombola '{}' a déjà un gagnant", giveaway.title);
    }
    if giveaway.status != GiveawayStatus::Active {
        bail!("La tombola '{}' n'est pas active", giveaway.title);
    }

    let entries = entries_for_giveaway(conn, giveaway_id)?;
    let weights: Vec<EntryWeight> = entries
        .iter()
        .map(|e| EntryWeight {
            user_id: e.user_id.clone(),
            tickets: e.tickets,
        })
        .collect();

    let winner_id = match seed {
        Some(s) => select_winner_seeded(&weights, s)?,
        None => {
            let mut rng = rand::rng();
            select_winner(&weights, move || rng.random::<f64>())?
        }
    };

    // Garde atomique : si un tirage concurrent a déjà commité, celui-ci est
    // abandonné plutôt que d'écraser le gagnant.
    if !set_winner(conn, giveaway_id, &winner_id)? {
        bail!("Tirage concurrent déjà enregistré pour '{}'", giveaway.title);
    }
    Ok(winner_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tombola_core::FairnessError;
    use tombola_db::db::{create_giveaway, create_task, migrate, set_fairness_config};
    use tombola_db::models::Giveaway;
    use tombola_core::FairnessConfig;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        conn
    }

    fn test_giveaway(conn: &Connection) -> Giveaway {
        create_giveaway(conn, "Noël", "Tombola de Noël", "Une console", "2026-12-24", None).unwrap()
    }

    #[test]
    fn test_join_single_entrant_probability_one() {
        let conn = test_conn();
        let g = test_giveaway(&conn);
        let u = signup(&conn, "a@b.c", "Alice", None, 50).unwrap();

        join_giveaway(&conn, &u.id, &g.id).unwrap();

        let entry = get_entry(&conn, &u.id, &g.id).unwrap().unwrap();
        assert_eq!(entry.tickets, 1);
        assert!((entry.probability - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_duplicate_join_rejected() {
        let conn = test_conn();
        let g = test_giveaway(&conn);
        let u = signup(&conn, "a@b.c", "Alice", None, 50).unwrap();
        join_giveaway(&conn, &u.id, &g.id).unwrap();
        assert!(join_giveaway(&conn, &u.id, &g.id).is_err());
    }

    #[test]
    fn test_max_entries_enforced() {
        let conn = test_conn();
        let g = create_giveaway(&conn, "Petite", "d", "p", "2026-12-24", Some(1)).unwrap();
        let a = signup(&conn, "a@b.c", "A", None, 50).unwrap();
        let b = signup(&conn, "b@b.c", "B", None, 50).unwrap();
        join_giveaway(&conn, &a.id, &g.id).unwrap();
        assert!(join_giveaway(&conn, &b.id, &g.id).is_err());
    }

    #[test]
    fn test_complete_task_recomputes_scenario() {
        // Barème par défaut, 150 points et 5 parrainages :
        // 1 + floor(150/50) + min(5,20)*2 = 14 tickets.
        let conn = test_conn();
        let g = test_giveaway(&conn);
        let alice = signup(&conn, "a@b.c", "Alice", None, 50).unwrap();
        join_giveaway(&conn, &alice.id, &g.id).unwrap();

        for i in 0..5 {
            signup(&conn, &format!("f{i}@b.c"), &format!("F{i}"), Some(&alice.referral_code), 0)
                .unwrap();
        }
        let t = create_task(&conn, &g.id, "Suivre la chaîne", "youtube", 150, 0).unwrap();
        let earned = complete_task(&conn, &alice.id, &t.id).unwrap();
        assert_eq!(earned, 150);

        let entry = get_entry(&conn, &alice.id, &g.id).unwrap().unwrap();
        assert_eq!(entry.tickets, 14);
        assert!((entry.probability - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_complete_task_requires_entry() {
        let conn = test_conn();
        let g = test_giveaway(&conn);
        let u = signup(&conn, "a@b.c", "A", None, 50).unwrap();
        let t = create_task(&conn, &g.id, "Partager", "share", 25, 0).unwrap();
        assert!(complete_task(&conn, &u.id, &t.id).is_err());
    }

    #[test]
    fn test_complete_task_twice_rejected() {
        let conn = test_conn();
        let g = test_giveaway(&conn);
        let u = signup(&conn, "a@b.c", "A", None, 50).unwrap();
        join_giveaway(&conn, &u.id, &g.id).unwrap();
        let t = create_task(&conn, &g.id, "Partager", "share", 25, 0).unwrap();
        complete_task(&conn, &u.id, &t.id).unwrap();
        assert!(complete_task(&conn, &u.id, &t.id).is_err());
    }

    #[test]
    fn test_referral_recomputes_every_entered_giveaway() {
        let conn = test_conn();
        let g1 = test_giveaway(&conn);
        let g2 = create_giveaway(&conn, "Été", "d", "p", "2026-07-14", None).unwrap();
        let parrain = signup(&conn, "p@b.c", "Parrain", None, 50).unwrap();
        let autre = signup(&conn, "x@b.c", "Autre", None, 50).unwrap();
        join_giveaway(&conn, &parrain.id, &g1.id).unwrap();
        join_giveaway(&conn, &parrain.id, &g2.id).unwrap();
        join_giveaway(&conn, &autre.id, &g1.id).unwrap();

        signup(&conn, "f@b.c", "Filleul", Some(&parrain.referral_code), 50).unwrap();

        // 50 points + 1 parrainage : 1 + 1 + 2 (+epsilon) = 4 tickets,
        // répercutés sur les deux tombolas.
        for g in [&g1, &g2] {
            let entry = get_entry(&conn, &parrain.id, &g.id).unwrap().unwrap();
            assert_eq!(entry.tickets, 4, "tombola {} non recalculée", g.title);
        }
        // L'autre participant de g1 a aussi été repassé (probabilités
        // renormalisées sur l'ensemble).
        let entry_autre = get_entry(&conn, &autre.id, &g1.id).unwrap().unwrap();
        let entry_parrain = get_entry(&conn, &parrain.id, &g1.id).unwrap().unwrap();
        assert!((entry_autre.probability + entry_parrain.probability - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_signup_unknown_referral_code_rejected() {
        let conn = test_conn();
        assert!(signup(&conn, "a@b.c", "A", Some("ZZZZZZZZ"), 50).is_err());
    }

    #[test]
    fn test_close_seeded_matches_core_draw() {
        let conn = test_conn();
        let g = test_giveaway(&conn);
        let mut users = Vec::new();
        for i in 0..3 {
            let u = signup(&conn, &format!("u{i}@b.c"), &format!("U{i}"), None, 50).unwrap();
            join_giveaway(&conn, &u.id, &g.id).unwrap();
            users.push(u);
        }

        let entries = entries_for_giveaway(&conn, &g.id).unwrap();
        let weights: Vec<EntryWeight> = entries
            .iter()
            .map(|e| EntryWeight {
                user_id: e.user_id.clone(),
                tickets: e.tickets,
            })
            .collect();
        let expected = select_winner_seeded(&weights, 42).unwrap();

        let winner = close_giveaway(&conn, &g.id, Some(42)).unwrap();
        assert_eq!(winner, expected);
        assert!(users.iter().any(|u| u.id == winner));

        let reloaded = get_giveaway(&conn, &g.id).unwrap().unwrap();
        assert_eq!(reloaded.status, GiveawayStatus::Ended);
        assert_eq!(reloaded.winner_id.as_deref(), Some(winner.as_str()));
    }

    #[test]
    fn test_close_twice_rejected() {
        let conn = test_conn();
        let g = test_giveaway(&conn);
        let u = signup(&conn, "a@b.c", "A", None, 50).unwrap();
        join_giveaway(&conn, &u.id, &g.id).unwrap();
        close_giveaway(&conn, &g.id, Some(1)).unwrap();
        assert!(close_giveaway(&conn, &g.id, Some(2)).is_err());
    }

    #[test]
    fn test_close_without_entries_rejected() {
        let conn = test_conn();
        let g = test_giveaway(&conn);
        let err = close_giveaway(&conn, &g.id, Some(1)).unwrap_err();
        assert_eq!(
            err.downcast_ref::<FairnessError>(),
            Some(&FairnessError::NoEntries)
        );
    }

    #[test]
    fn test_recompute_rejects_invalid_stored_config() {
        let conn = test_conn();
        let g = test_giveaway(&conn);
        let u = signup(&conn, "a@b.c", "A", None, 50).unwrap();
        join_giveaway(&conn, &u.id, &g.id).unwrap();

        set_fairness_config(
            &conn,
            &FairnessConfig {
                ratio_cap: 0.2,
                ..FairnessConfig::default()
            },
        )
        .unwrap();
        let err = recompute_probabilities(&conn, &g.id).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FairnessError>(),
            Some(FairnessError::InvalidConfig(_))
        ));
    }
}
