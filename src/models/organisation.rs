use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Une organisation cliente
///
/// Le solde de crédits n'est jamais assigné directement : seules les
/// opérations du Ledger (`core::ledger_service`) le modifient, via une
/// expression SQL atomique.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Organisation {
    /// ID unique
    pub id: Uuid,

    /// Nom de l'organisation
    pub nom: String,

    /// Solde de crédits (jamais négatif)
    pub solde_credits: Decimal,

    /// Tarif débité par document généré
    pub tarif_document: Decimal,

    /// ID client Stripe
    pub stripe_customer_id: Option<String>,

    /// Vrai si un débit a atteint le plancher zéro (solde insuffisant)
    pub sous_finance: bool,

    /// Date de création
    pub created_at: DateTime<Utc>,

    /// Date de mise à jour
    pub updated_at: DateTime<Utc>,
}

impl Organisation {
    /// Crée une nouvelle organisation avec un solde nul
    pub fn new(nom: String, tarif_document: Decimal) -> Self {
        let now = Utc::now();

        Self {
            id: Uuid::new_v4(),
            nom,
            solde_credits: Decimal::ZERO,
            tarif_document,
            stripe_customer_id: None,
            sous_finance: false,
            created_at: now,
            updated_at: now,
        }
    }
}
