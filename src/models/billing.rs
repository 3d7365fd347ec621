use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};

/// État d'une transaction Stripe
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "statut_transaction", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StatutTransaction {
    Pending,
    Succeeded,
    Failed,
    Refunded,
    Canceled,
}

/// Trace d'audit d'un achat de crédits
///
/// Immuable une fois `succeeded` : le repository refuse toute mise à jour
/// ultérieure.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StripeTransaction {
    /// ID unique
    pub id: Uuid,

    /// Organisation créditée
    pub organisation_id: Uuid,

    /// Session de paiement chez le fournisseur
    pub stripe_session_id: String,

    /// Montant payé
    pub montant: Decimal,

    /// Crédits accordés (montant + bonus de palier)
    pub credits_accordes: Decimal,

    /// État
    pub statut: StatutTransaction,

    /// Date de création
    pub created_at: DateTime<Utc>,

    /// Date de mise à jour
    pub updated_at: DateTime<Utc>,
}

impl StripeTransaction {
    pub fn new(organisation_id: Uuid, stripe_session_id: String, montant: Decimal) -> Self {
        let now = Utc::now();

        Self {
            id: Uuid::new_v4(),
            organisation_id,
            stripe_session_id,
            montant,
            credits_accordes: credits_accordes(montant),
            statut: StatutTransaction::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Pourcentage de bonus selon le montant d'achat
///
/// Paliers inclusifs à la borne basse, exclusifs au-dessus : 999 reste
/// dans le palier 10 %.
pub fn pourcentage_bonus(montant: Decimal) -> Decimal {
    if montant >= Decimal::from(1000) {
        Decimal::from(20)
    } else if montant >= Decimal::from(250) {
        Decimal::from(10)
    } else if montant >= Decimal::from(100) {
        Decimal::from(5)
    } else {
        Decimal::ZERO
    }
}

/// Crédits accordés pour un achat : montant + bonus, arrondi à l'unité
pub fn credits_accordes(montant: Decimal) -> Decimal {
    let bonus = montant * pourcentage_bonus(montant) / Decimal::from(100);
    (montant + bonus).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn paliers_de_bonus() {
        assert_eq!(pourcentage_bonus(dec!(99)), dec!(0));
        assert_eq!(pourcentage_bonus(dec!(100)), dec!(5));
        assert_eq!(pourcentage_bonus(dec!(249)), dec!(5));
        assert_eq!(pourcentage_bonus(dec!(250)), dec!(10));
        // borne basse inclusive, exclusive au-dessus
        assert_eq!(pourcentage_bonus(dec!(999)), dec!(10));
        assert_eq!(pourcentage_bonus(dec!(1000)), dec!(20));
    }

    #[test]
    fn credits_arrondis_a_l_unite() {
        assert_eq!(credits_accordes(dec!(100)), dec!(105));
        assert_eq!(credits_accordes(dec!(999)), dec!(1099)); // 1098.9 -> 1099
        assert_eq!(credits_accordes(dec!(1000)), dec!(1200));
        assert_eq!(credits_accordes(dec!(50)), dec!(50));
    }
}
