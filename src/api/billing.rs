// api/billing.rs
use actix_web::{web, HttpRequest, HttpResponse};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use crate::core::ledger_service::LedgerService;
use crate::models::StatutTransaction;
use crate::services::database::Database;
use crate::utils::config::Config;
use crate::utils::error::{AppError, Result};

/// Configure les routes de facturation
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/billing")
            // Solde et tarif
            .route("/credits", web::get().to(get_credits))
            // Webhook Stripe (pas d'authentification requise)
            .route("/webhook/stripe", web::post().to(stripe_webhook)),
    );
}

#[derive(Debug, Deserialize)]
struct CreditsQuery {
    organisation_id: Uuid,
}

/// Solde de crédits d'une organisation
async fn get_credits(
    db: web::Data<Database>,
    query: web::Query<CreditsQuery>,
) -> Result<HttpResponse> {
    let organisation = db.get_organisation(query.organisation_id).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "solde_credits": organisation.solde_credits,
        "tarif_document": organisation.tarif_document,
        "sous_finance": organisation.sous_finance,
    })))
}

/// Webhook Stripe : confirmation externe de paiement
///
/// La création de session de checkout reste chez le fournisseur ; ici on
/// ne fait que vérifier la signature et traduire l'événement en opération
/// du Ledger.
async fn stripe_webhook(
    ledger: web::Data<LedgerService>,
    config: web::Data<Config>,
    requete: HttpRequest,
    payload: web::Bytes,
) -> Result<HttpResponse> {
    let secret = config
        .stripe_webhook_secret
        .as_deref()
        .ok_or_else(|| AppError::Stripe("webhook Stripe non configuré".to_string()))?;

    let signature = requete
        .headers()
        .get("Stripe-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Validation("signature Stripe manquante".to_string()))?;

    let corps = std::str::from_utf8(&payload)
        .map_err(|_| AppError::Validation("payload webhook invalide".to_string()))?;

    let evenement = stripe::Webhook::construct_event(corps, signature, secret)
        .map_err(|e| AppError::Stripe(format!("signature invalide: {}", e)))?;

    match evenement.type_ {
        stripe::EventType::CheckoutSessionCompleted => {
            if let stripe::EventObject::CheckoutSession(session) = evenement.data.object {
                let organisation_id = session
                    .client_reference_id
                    .as_deref()
                    .and_then(|id| Uuid::parse_str(id).ok())
                    .ok_or_else(|| {
                        AppError::Stripe("session sans référence d'organisation".to_string())
                    })?;

                // Montant en centimes chez Stripe
                let montant = Decimal::from(session.amount_total.unwrap_or(0))
                    / Decimal::from(100);

                ledger
                    .confirmer_achat(organisation_id, session.id.as_str(), montant)
                    .await?;
            }
        }
        stripe::EventType::CheckoutSessionExpired => {
            if let stripe::EventObject::CheckoutSession(session) = evenement.data.object {
                ledger
                    .echouer_achat(session.id.as_str(), StatutTransaction::Canceled)
                    .await?;
            }
        }
        autre => {
            // Les autres événements ne concernent pas le Ledger
            warn!("Événement Stripe ignoré: {}", autre);
        }
    }

    Ok(HttpResponse::Ok().json("Webhook traité"))
}
