mod actions;
mod display;

use anyhow::{bail, Context, Result};
use chrono::{Datelike, TimeZone, Utc};
use clap::{Parser, Subcommand, ValueEnum};

use tombola_core::FairnessConfig;
use tombola_db::db::{
    create_giveaway, create_donation, create_task, db_path, delete_giveaway, donor_leaderboard,
    get_fairness_config, get_user_by_email, giveaway_leaderboard, get_giveaway, list_giveaways,
    migrate, open_db, platform_stats, set_fairness_config, set_user_anonymous, winners,
};
use tombola_db::models::{validate_donation_amount, GiveawayStatus, User};
use tombola_db::rusqlite::Connection;

use crate::actions::{close_giveaway, complete_task, join_giveaway, signup};
use crate::display::{
    display_config, display_donors, display_giveaways, display_leaderboard, display_stats,
    display_winners,
};

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum Period {
    Monthly,
    #[default]
    AllTime,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StatusFilter {
    Active,
    Ended,
    Cancelled,
    All,
}

#[derive(Parser)]
#[command(name = "tombola", about = "Plateforme de tombolas communautaires — tirage pondéré équitable")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Créer une tombola
    CreateGiveaway {
        #[arg(short, long)]
        title: String,
        #[arg(short, long)]
        description: String,
        /// Description du lot à gagner
        #[arg(short, long)]
        prize: String,
        /// Date de fin (AAAA-MM-JJ)
        #[arg(short, long)]
        end_date: String,
        /// Nombre maximum de participations
        #[arg(short, long)]
        max_entries: Option<u32>,
    },

    /// Ajouter une mission à une tombola
    AddTask {
        #[arg(short, long)]
        giveaway: String,
        #[arg(short, long)]
        title: String,
        /// Type de mission (share, youtube, twitter, custom…)
        #[arg(short, long, default_value = "custom")]
        kind: String,
        /// Points accordés à l'accomplissement
        #[arg(short, long)]
        points: u32,
        /// Position d'affichage
        #[arg(long, default_value = "0")]
        position: u32,
    },

    /// Inscrire un utilisateur, avec code de parrainage optionnel
    Signup {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        name: String,
        /// Code de parrainage du parrain
        #[arg(short, long)]
        referred_by: Option<String>,
        /// Points crédités au parrain
        #[arg(long, default_value = "50")]
        referral_points: u32,
    },

    /// Supprimer une tombola et tout ce qui s'y rattache
    DeleteGiveaway {
        #[arg(short, long)]
        giveaway: String,
    },

    /// Modifier le profil : affichage anonyme dans les classements
    SetProfile {
        #[arg(short, long)]
        email: String,
        /// true pour masquer le nom, false pour l'afficher
        #[arg(short, long, action = clap::ArgAction::Set)]
        anonymous: bool,
    },

    /// Rejoindre une tombola
    Join {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        giveaway: String,
    },

    /// Accomplir une mission (crédite les points et recalcule les probabilités)
    Complete {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        task: String,
    },

    /// Enregistrer un don
    Donate {
        /// Email du donateur inscrit (sinon --name pour un don anonyme)
        #[arg(short, long)]
        email: Option<String>,
        /// Nom du donateur non inscrit
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short, long)]
        amount: f64,
        /// Masquer le nom dans les classements
        #[arg(long)]
        anonymous: bool,
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Clore une tombola : tirage pondéré du gagnant, une seule fois
    Close {
        #[arg(short, long)]
        giveaway: String,
        /// Graine du tirage, pour un résultat reproductible (audit)
        #[arg(short, long)]
        seed: Option<u64>,
    },

    /// Classement des participants d'une tombola
    Leaderboard {
        #[arg(short, long)]
        giveaway: String,
    },

    /// Classement des donateurs
    Donors {
        #[arg(short, long, default_value = "all-time")]
        period: Period,
    },

    /// Lister les gagnants
    Winners,

    /// Lister les tombolas
    List {
        #[arg(short, long, default_value = "all")]
        status: StatusFilter,
    },

    /// Statistiques de la plateforme
    Stats,

    /// Afficher la configuration d'équité
    ShowConfig,

    /// Modifier la configuration d'équité (champs omis inchangés)
    SetConfig {
        #[arg(long)]
        base: Option<f64>,
        #[arg(long)]
        points_divisor: Option<u32>,
        #[arg(long)]
        alpha: Option<f64>,
        #[arg(long)]
        beta: Option<f64>,
        #[arg(long)]
        referral_cap: Option<u32>,
        #[arg(long)]
        max_tickets: Option<f64>,
        #[arg(long)]
        ratio_cap: Option<f64>,
        #[arg(long)]
        epsilon: Option<f64>,
    },

    /// Afficher le chemin de la base de données
    DbPath,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let path = db_path();
    let conn = open_db(&path)?;
    migrate(&conn)?;

    match cli.command {
        Command::CreateGiveaway {
            title,
            description,
            prize,
            end_date,
            max_entries,
        } => {
            let giveaway = create_giveaway(&conn, &title, &description, &prize, &end_date, max_entries)?;
            println!("Tombola créée : {}", giveaway.id);
            Ok(())
        }
        Command::AddTask {
            giveaway,
            title,
            kind,
            points,
            position,
        } => {
            get_giveaway(&conn, &giveaway)?
                .with_context(|| format!("Tombola inconnue : {}", giveaway))?;
            let task = create_task(&conn, &giveaway, &title, &kind, points, position)?;
            println!("Mission créée : {} ({} points)", task.id, task.points);
            Ok(())
        }
        Command::Signup {
            email,
            name,
            referred_by,
            referral_points,
        } => {
            let user = signup(&conn, &email, &name, referred_by.as_deref(), referral_points)?;
            println!("Utilisateur inscrit : {}", user.id);
            println!("Code de parrainage  : {}", user.referral_code);
            Ok(())
        }
        Command::DeleteGiveaway { giveaway } => {
            let g = get_giveaway(&conn, &giveaway)?
                .with_context(|| format!("Tombola inconnue : {}", giveaway))?;
            delete_giveaway(&conn, &g.id)?;
            println!("Tombola '{}' supprimée (missions et participations comprises).", g.title);
            Ok(())
        }
        Command::SetProfile { email, anonymous } => {
            let user = user_by_email(&conn, &email)?;
            set_user_anonymous(&conn, &user.id, anonymous)?;
            if anonymous {
                println!("Profil masqué : affiché comme « Anonyme » dans les classements.");
            } else {
                println!("Profil visible dans les classements.");
            }
            Ok(())
        }
        Command::Join { email, giveaway } => {
            let user = user_by_email(&conn, &email)?;
            join_giveaway(&conn, &user.id, &giveaway)?;
            println!("Participation enregistrée.");
            Ok(())
        }
        Command::Complete { email, task } => {
            let user = user_by_email(&conn, &email)?;
            let earned = complete_task(&conn, &user.id, &task)?;
            println!("Mission accomplie : +{} points.", earned);
            Ok(())
        }
        Command::Donate {
            email,
            name,
            amount,
            anonymous,
            message,
        } => cmd_donate(&conn, email, name, amount, anonymous, message),
        Command::Close { giveaway, seed } => {
            let winner_id = close_giveaway(&conn, &giveaway, seed)?;
            println!("🎉 Gagnant tiré : {}", winner_id);
            Ok(())
        }
        Command::Leaderboard { giveaway } => {
            let g = get_giveaway(&conn, &giveaway)?
                .with_context(|| format!("Tombola inconnue : {}", giveaway))?;
            let rows = giveaway_leaderboard(&conn, &giveaway)?;
            display_leaderboard(&rows, &g.title);
            Ok(())
        }
        Command::Donors { period } => {
            let (since, label) = match period {
                Period::Monthly => (Some(month_start()?), "mensuel"),
                Period::AllTime => (None, "historique"),
            };
            let rows = donor_leaderboard(&conn, since.as_deref())?;
            display_donors(&rows, label);
            Ok(())
        }
        Command::Winners => {
            let wins = winners(&conn)?;
            display_winners(&wins);
            Ok(())
        }
        Command::List { status } => {
            let filter = match status {
                StatusFilter::Active => Some(GiveawayStatus::Active),
                StatusFilter::Ended => Some(GiveawayStatus::Ended),
                StatusFilter::Cancelled => Some(GiveawayStatus::Cancelled),
                StatusFilter::All => None,
            };
            let giveaways = list_giveaways(&conn, filter)?;
            display_giveaways(&giveaways);
            Ok(())
        }
        Command::Stats => {
            let stats = platform_stats(&conn)?;
            display_stats(&stats);
            Ok(())
        }
        Command::ShowConfig => {
            let config = get_fairness_config(&conn)?;
            display_config(&config);
            Ok(())
        }
        Command::SetConfig {
            base,
            points_divisor,
            alpha,
            beta,
            referral_cap,
            max_tickets,
            ratio_cap,
            epsilon,
        } => {
            let mut config = get_fairness_config(&conn)?;
            if let Some(v) = base {
                config.base = v;
            }
            if let Some(v) = points_divisor {
                config.points_divisor = v;
            }
            if let Some(v) = alpha {
                config.alpha = v;
            }
            if let Some(v) = beta {
                config.beta = v;
            }
            if let Some(v) = referral_cap {
                config.referral_cap = v;
            }
            if let Some(v) = max_tickets {
                config.max_tickets = v;
            }
            if let Some(v) = ratio_cap {
                config.ratio_cap = v;
            }
            if let Some(v) = epsilon {
                config.epsilon = v;
            }
            // Une configuration hors domaine n'est jamais persistée.
            config.validate()?;
            set_fairness_config(&conn, &config)?;
            println!("Configuration mise à jour.");
            display_config(&config);
            Ok(())
        }
        Command::DbPath => {
            println!("{}", path.display());
            Ok(())
        }
    }
}

fn user_by_email(conn: &Connection, email: &str) -> Result<User> {
    get_user_by_email(conn, email)?
        .with_context(|| format!("Aucun utilisateur avec l'email {}", email))
}

fn cmd_donate(
    conn: &Connection,
    email: Option<String>,
    name: Option<String>,
    amount: f64,
    anonymous: bool,
    message: Option<String>,
) -> Result<()> {
    validate_donation_amount(amount)?;

    let (user_id, donor_name) = match (&email, &name) {
        (Some(email), _) => {
            let user = user_by_email(conn, email)?;
            (Some(user.id), user.display_name)
        }
        (None, Some(name)) => (None, name.clone()),
        (None, None) => bail!("Précisez --email (donateur inscrit) ou --name"),
    };

    let donation = create_donation(
        conn,
        user_id.as_deref(),
        &donor_name,
        amount,
        anonymous,
        message.as_deref(),
    )?;
    println!("Merci ! Don de {:.2} € enregistré ({}).", donation.amount, donation.id);
    Ok(())
}

fn month_start() -> Result<String> {
    let now = Utc::now();
    let start = Utc
        .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .context("Début de mois incalculable")?;
    Ok(start.to_rfc3339())
}
