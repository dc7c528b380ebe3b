use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};

use tombola_core::FairnessConfig;
use tombola_db::models::{DonorRow, Giveaway, GiveawayStatus, LeaderboardRow, PlatformStats, User};

fn masked_name(display_name: &str, is_anonymous: bool) -> String {
    if is_anonymous {
        "Anonyme".to_string()
    } else {
        display_name.to_string()
    }
}

pub fn display_giveaways(giveaways: &[Giveaway]) {
    if giveaways.is_empty() {
        println!("Aucune tombola à afficher.");
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Id", "Titre", "Lot", "Fin", "Statut", "Participations"]);

    for g in giveaways {
        let status_color = match g.status {
            GiveawayStatus::Active => Color::Green,
            GiveawayStatus::Ended => Color::Blue,
            GiveawayStatus::Cancelled => Color::Red,
        };
        let entries = match g.max_entries {
            Some(max) => format!("{}/{}", g.entry_count, max),
            None => g.entry_count.to_string(),
        };
        table.add_row(vec![
            Cell::new(&g.id),
            Cell::new(&g.title),
            Cell::new(&g.prize_description),
            Cell::new(&g.end_date),
            Cell::new(g.status.to_string()).fg(status_color),
            Cell::new(entries),
        ]);
    }
    println!("{table}");
}

pub fn display_leaderboard(rows: &[LeaderboardRow], title: &str) {
    println!("\n🎟️  Classement — {title}\n");
    if rows.is_empty() {
        println!("Aucune participation pour l'instant.");
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["#", "Participant", "Tickets", "Probabilité"]);

    for (i, row) in rows.iter().enumerate() {
        table.add_row(vec![
            format!("{}", i + 1),
            masked_name(&row.display_name, row.is_anonymous),
            row.tickets.to_string(),
            format!("{:.2} %", row.probability * 100.0),
        ]);
    }
    println!("{table}");
}

pub fn display_donors(rows: &[DonorRow], period_label: &str) {
    println!("\n💝 Classement des donateurs ({period_label})\n");
    if rows.is_empty() {
        println!("Aucun don sur la période.");
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["#", "Donateur", "Total", "Dons"]);

    for (i, row) in rows.iter().enumerate() {
        table.add_row(vec![
            format!("{}", i + 1),
            masked_name(&row.display_name, row.is_anonymous),
            format!("{:.2} €", row.total_amount),
            row.donation_count.to_string(),
        ]);
    }
    println!("{table}");
}

pub fn display_winners(winners: &[(Giveaway, User)]) {
    println!("\n🏆 Gagnants\n");
    if winners.is_empty() {
        println!("Aucun gagnant pour l'instant.");
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Tombola", "Lot", "Gagnant"]);

    for (giveaway, user) in winners {
        table.add_row(vec![
            giveaway.title.clone(),
            giveaway.prize_description.clone(),
            masked_name(&user.display_name, user.is_anonymous),
        ]);
    }
    println!("{table}");
}

pub fn display_stats(stats: &PlatformStats) {
    println!("📈 Statistiques de la plateforme");
    println!("  Tombolas actives   : {}", stats.active_giveaways);
    println!("  Gagnants tirés     : {}", stats.total_winners);
    println!("  Points distribués  : {}", stats.points_distributed);
}

pub fn display_config(config: &FairnessConfig) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Paramètre", "Valeur", "Rôle"]);

    table.add_row(vec!["base".to_string(), config.base.to_string(), "tickets plancher".to_string()]);
    table.add_row(vec![
        "points_divisor".to_string(),
        config.points_divisor.to_string(),
        "points par bloc".to_string(),
    ]);
    table.add_row(vec!["alpha".to_string(), config.alpha.to_string(), "tickets par bloc de points".to_string()]);
    table.add_row(vec!["beta".to_string(), config.beta.to_string(), "tickets par parrainage".to_string()]);
    table.add_row(vec![
        "referral_cap".to_string(),
        config.referral_cap.to_string(),
        "parrainages comptés linéairement".to_string(),
    ]);
    table.add_row(vec!["max_tickets".to_string(), config.max_tickets.to_string(), "plafond absolu".to_string()]);
    table.add_row(vec![
        "ratio_cap".to_string(),
        config.ratio_cap.to_string(),
        "multiple maximum de la médiane".to_string(),
    ]);
    table.add_row(vec!["epsilon".to_string(), config.epsilon.to_string(), "plancher de probabilité".to_string()]);
    println!("{table}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masked_name() {
        assert_eq!(masked_name("Alice", false), "Alice");
        assert_eq!(masked_name("Alice", true), "Anonyme");
    }
}
