//! Rental inspection and operator commands.

use std::str::FromStr;

use chrono::Utc;
use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{self, OutputFormat};
use rewind_core::error::AppError;
use rewind_core::types::{FilmId, RentalId, UserId};
use rewind_database::RentalFilter;
use rewind_entity::rental::Rental;

/// Arguments for rental commands
#[derive(Debug, Args)]
pub struct RentalArgs {
    /// Rental subcommand
    #[command(subcommand)]
    pub command: RentalCommand,
}

/// Rental subcommands
#[derive(Debug, Subcommand)]
pub enum RentalCommand {
    /// List rentals, active only unless --all
    List {
        /// Only this holder's rentals
        #[arg(long)]
        user: Option<String>,
        /// Only rentals of this film
        #[arg(long)]
        film: Option<String>,
        /// Include ended rentals
        #[arg(long)]
        all: bool,
        /// Maximum rows
        #[arg(long, default_value_t = 100)]
        limit: i64,
    },
    /// Show one rental in full
    Show {
        /// Rental ID
        id: String,
    },
    /// Run the expiry sweep once
    Sweep,
    /// Revoke access points no active rental owns, once past the grace window
    Recover,
    /// End an active rental now
    End {
        /// Rental ID
        id: String,
        /// Reason recorded with the event
        #[arg(long, default_value = "operator")]
        reason: String,
        /// Skip confirmation
        #[arg(long)]
        force: bool,
    },
}

/// Rental display row
#[derive(Debug, Serialize, Tabled)]
struct RentalRow {
    /// Rental ID
    id: String,
    /// Film
    film: String,
    /// Holder
    user: String,
    /// Tier
    tier: String,
    /// Viewing mode
    mode: String,
    /// Watched
    progress: String,
    /// Expires
    expires: String,
    /// Status
    status: String,
}

impl From<&Rental> for RentalRow {
    fn from(r: &Rental) -> Self {
        Self {
            id: r.id.to_string(),
            film: r.film_id.to_string()[..8].to_string(),
            user: r.user_id.to_string()[..8].to_string(),
            tier: r.tier.to_string(),
            mode: r.viewing_mode.to_string(),
            progress: format!("{}%", r.watch_progress_percent),
            expires: r.expires_at.format("%Y-%m-%d %H:%M").to_string(),
            status: status(r),
        }
    }
}

fn status(r: &Rental) -> String {
    match (r.is_active, r.end_reason) {
        (true, _) if r.is_stale_at(Utc::now()) => "overdue".to_string(),
        (true, _) if r.return_requested => "return requested".to_string(),
        (true, _) => "active".to_string(),
        (false, Some(reason)) => reason.to_string(),
        (false, None) => "ended".to_string(),
    }
}

fn parse_id<T: FromStr>(raw: &str, what: &str) -> Result<T, AppError> {
    raw.parse()
        .map_err(|_| AppError::validation(format!("Invalid {what} ID: {raw}")))
}

/// Execute rental commands
pub async fn execute(
    args: &RentalArgs,
    config_path: &str,
    format: OutputFormat,
) -> Result<(), AppError> {
    let config = super::load_config(config_path)?;
    let db = super::connect(&config).await?;
    let service = super::build_service(&config, &db).await?;

    match &args.command {
        RentalCommand::List {
            user,
            film,
            all,
            limit,
        } => {
            let filter = RentalFilter {
                user_id: user.as_deref().map(|u| parse_id::<UserId>(u, "user")).transpose()?,
                film_id: film.as_deref().map(|f| parse_id::<FilmId>(f, "film")).transpose()?,
                include_ended: *all,
                limit: Some(*limit),
            };
            let rentals = service.list(&filter).await?;
            let rows: Vec<RentalRow> = rentals.iter().map(RentalRow::from).collect();
            output::print_list(&rows, format);
        }
        RentalCommand::Show { id } => {
            let rental = service.get(parse_id::<RentalId>(id, "rental")?).await?;
            match format {
                OutputFormat::Json => output::print_json(&rental),
                OutputFormat::Table => {
                    println!("Rental {}", rental.id);
                    output::print_kv("Film", &rental.film_id.to_string());
                    output::print_kv("Holder", &rental.user_id.to_string());
                    output::print_kv("Status", &status(&rental));
                    output::print_kv("Tier", &format!("{} ({} credits)", rental.tier, rental.cost));
                    output::print_kv("Viewing mode", &rental.viewing_mode.to_string());
                    output::print_kv("Progress", &format!("{}%", rental.watch_progress_percent));
                    output::print_kv("Rewind claimed", &rental.rewind_claimed.to_string());
                    output::print_kv("Return requested", &rental.return_requested.to_string());
                    output::print_kv("Rented at", &rental.rented_at.to_rfc3339());
                    output::print_kv("Expires at", &rental.expires_at.to_rfc3339());
                    if let Some(ended) = rental.ended_at {
                        output::print_kv("Ended at", &ended.to_rfc3339());
                    }
                    if let Some(token) = rental.access_token {
                        output::print_kv("Access token", &format!("{}…", token.short()));
                    }
                }
            }
        }
        RentalCommand::Sweep => {
            let report = service.expiry().sweep().await?;
            match format {
                OutputFormat::Json => output::print_json(&report),
                OutputFormat::Table => {
                    output::print_kv("Examined", &report.examined.to_string());
                    output::print_kv("Expired", &report.expired.to_string());
                    output::print_kv("Failed", &report.failed.to_string());
                }
            }
            if report.failed > 0 {
                output::print_warning("Some rentals could not be retired; the next sweep retries them.");
            }
        }
        RentalCommand::Recover => {
            let report = service.recovery().reconcile().await?;
            match format {
                OutputFormat::Json => output::print_json(&report),
                OutputFormat::Table => {
                    output::print_kv("Live", &report.live.to_string());
                    output::print_kv("Orphaned", &report.orphaned.to_string());
                    output::print_kv("Revoked", &report.revoked.to_string());
                    output::print_kv("Pending", &report.pending.to_string());
                    output::print_kv("Failed", &report.failed.to_string());
                }
            }
            if report.pending > 0 {
                output::print_warning(
                    "Some orphans are inside the grace window; run recover again later.",
                );
            }
        }
        RentalCommand::End { id, reason, force } => {
            let rental_id = parse_id::<RentalId>(id, "rental")?;
            if !force {
                let confirm = dialoguer::Confirm::new()
                    .with_prompt(format!("End rental {rental_id} now and revoke its access?"))
                    .default(false)
                    .interact()
                    .map_err(|e| AppError::internal(format!("Input error: {e}")))?;

                if !confirm {
                    println!("Cancelled.");
                    return Ok(());
                }
            }

            let ended = service.force_end(rental_id, reason).await?;
            output::print_success(&format!(
                "Rental {} ended, film {} is free",
                ended.id, ended.film_id
            ));
        }
    }

    db.close().await;
    Ok(())
}
