// core/ledger_service.rs
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{credits_accordes, StatutTransaction, StripeTransaction};
use crate::services::database::Database;
use crate::utils::error::{AppError, Result};

/// Le Ledger : seules portes d'entrée vers le solde d'une organisation
///
/// Débit et crédit s'appuient sur une expression SQL atomique unique
/// (`services::database`) : deux générations simultanées pour la même
/// organisation ne peuvent pas lire puis réécrire un solde périmé.
pub struct LedgerService {
    db: Arc<Database>,
}

impl LedgerService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Débite une organisation, plancher à zéro
    ///
    /// La règle métier est « laisser passer le document puis signaler
    /// l'organisation sous-financée », jamais bloquer un export dont la
    /// valeur est déjà produite. Retourne le nouveau solde.
    pub async fn debit(&self, organisation_id: Uuid, montant: Decimal) -> Result<Decimal> {
        if montant < Decimal::ZERO {
            return Err(AppError::Ledger("montant de débit négatif".to_string()));
        }

        let (solde, sous_finance) = self.db.debiter_credits(organisation_id, montant).await?;

        if sous_finance {
            warn!(
                "Organisation {} sous-financée: débit de {} plafonné, solde {}",
                organisation_id, montant, solde
            );
        }

        Ok(solde)
    }

    /// Crédite une organisation, sans plancher
    pub async fn credit(&self, organisation_id: Uuid, montant: Decimal) -> Result<Decimal> {
        if montant < Decimal::ZERO {
            return Err(AppError::Ledger("montant de crédit négatif".to_string()));
        }

        self.db.crediter_credits(organisation_id, montant).await
    }

    /// Confirme un achat de crédits venu du webhook de paiement
    ///
    /// Idempotent par session : un webhook rejoué sur une transaction déjà
    /// confirmée ne crédite pas une seconde fois.
    pub async fn confirmer_achat(
        &self,
        organisation_id: Uuid,
        stripe_session_id: &str,
        montant: Decimal,
    ) -> Result<StripeTransaction> {
        if let Some(existante) = self
            .db
            .get_transaction_par_session(stripe_session_id)
            .await?
        {
            if existante.statut == StatutTransaction::Succeeded {
                info!(
                    "Webhook rejoué pour la session {}, transaction déjà confirmée",
                    stripe_session_id
                );
                return Ok(existante);
            }

            let accordes = existante.credits_accordes;
            let confirmee = self
                .db
                .update_transaction_statut(existante.id, StatutTransaction::Succeeded)
                .await?;
            self.credit(organisation_id, accordes).await?;
            return Ok(confirmee);
        }

        let transaction =
            StripeTransaction::new(organisation_id, stripe_session_id.to_string(), montant);
        let creee = self.db.create_transaction(&transaction).await?;

        let confirmee = self
            .db
            .update_transaction_statut(creee.id, StatutTransaction::Succeeded)
            .await?;

        let solde = self.credit(organisation_id, confirmee.credits_accordes).await?;
        info!(
            "Achat confirmé: organisation {} créditée de {} (montant {}), solde {}",
            organisation_id, confirmee.credits_accordes, montant, solde
        );

        Ok(confirmee)
    }

    /// Enregistre l'échec ou l'abandon d'une session de paiement
    pub async fn echouer_achat(
        &self,
        stripe_session_id: &str,
        statut: StatutTransaction,
    ) -> Result<()> {
        if let Some(existante) = self
            .db
            .get_transaction_par_session(stripe_session_id)
            .await?
        {
            // Une transaction confirmée est immuable, la garde est en base
            if existante.statut != StatutTransaction::Succeeded {
                self.db
                    .update_transaction_statut(existante.id, statut)
                    .await?;
            }
        }

        Ok(())
    }

    /// Montant de crédits accordés pour un achat, bonus de palier compris
    pub fn credits_pour_achat(montant: Decimal) -> Decimal {
        credits_accordes(montant)
    }
}
