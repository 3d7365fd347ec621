// services/database.rs
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;
use rust_decimal::Decimal;

use crate::models::{
    Organisation, Proposition, PropositionTemplate, StatutProposition, StatutTemplate,
    StatutTransaction, StripeTransaction,
};
use crate::utils::error::{AppError, Result};

/// Accès à la base de données
///
/// Toutes les requêtes passent par ce service ; en particulier, le solde
/// de crédits n'est modifié que par `debiter_credits` / `crediter_credits`,
/// chacune une unique expression SQL atomique.
#[derive(Debug, Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Ouvre le pool de connexions
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Applique les migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // === Organisations ===

    pub async fn create_organisation(&self, organisation: &Organisation) -> Result<Organisation> {
        let cree = sqlx::query_as::<_, Organisation>(
            r#"
            INSERT INTO organisations (
                id, nom, solde_credits, tarif_document, stripe_customer_id,
                sous_finance, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(organisation.id)
        .bind(&organisation.nom)
        .bind(organisation.solde_credits)
        .bind(organisation.tarif_document)
        .bind(&organisation.stripe_customer_id)
        .bind(organisation.sous_finance)
        .bind(organisation.created_at)
        .bind(organisation.updated_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(cree)
    }

    pub async fn get_organisation(&self, id: Uuid) -> Result<Organisation> {
        let organisation = sqlx::query_as::<_, Organisation>(
            "SELECT * FROM organisations WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Organisation".to_string()))?;

        Ok(organisation)
    }

    /// Débit atomique avec plancher à zéro
    ///
    /// Une seule expression SQL : pas de read-modify-write applicatif, deux
    /// exports concurrents sur la même organisation ne peuvent pas perdre
    /// de mise à jour. Dans le SET, `solde_credits` désigne la valeur
    /// d'avant mise à jour : le drapeau de sous-financement est posé dans
    /// la même instruction quand le plancher joue. Retourne le nouveau
    /// solde et le drapeau.
    pub async fn debiter_credits(&self, id: Uuid, montant: Decimal) -> Result<(Decimal, bool)> {
        let (solde, sous_finance) = sqlx::query_as::<_, (Decimal, bool)>(
            r#"
            UPDATE organisations
            SET solde_credits = GREATEST(0, solde_credits - $2),
                sous_finance = sous_finance OR (solde_credits < $2),
                updated_at = NOW()
            WHERE id = $1
            RETURNING solde_credits, sous_finance
            "#,
        )
        .bind(id)
        .bind(montant)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Organisation".to_string()))?;

        Ok((solde, sous_finance))
    }

    /// Crédit atomique, sans plancher ; lève le drapeau de sous-financement
    /// si le solde redevient positif
    pub async fn crediter_credits(&self, id: Uuid, montant: Decimal) -> Result<Decimal> {
        let (solde,) = sqlx::query_as::<_, (Decimal,)>(
            r#"
            UPDATE organisations
            SET solde_credits = solde_credits + $2,
                sous_finance = sous_finance AND (solde_credits + $2) <= 0,
                updated_at = NOW()
            WHERE id = $1
            RETURNING solde_credits
            "#,
        )
        .bind(id)
        .bind(montant)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Organisation".to_string()))?;

        Ok(solde)
    }

    // === Templates ===

    pub async fn create_template(
        &self,
        template: &PropositionTemplate,
    ) -> Result<PropositionTemplate> {
        let cree = sqlx::query_as::<_, PropositionTemplate>(
            r#"
            INSERT INTO proposition_templates (
                id, organisation_id, nom, file_type, file_config, statut,
                fichier_url, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(template.id)
        .bind(template.organisation_id)
        .bind(&template.nom)
        .bind(template.file_type)
        .bind(&template.file_config)
        .bind(template.statut)
        .bind(&template.fichier_url)
        .bind(template.created_at)
        .bind(template.updated_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(cree)
    }

    pub async fn get_template(&self, id: Uuid) -> Result<PropositionTemplate> {
        let template = sqlx::query_as::<_, PropositionTemplate>(
            "SELECT * FROM proposition_templates WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Template".to_string()))?;

        Ok(template)
    }

    pub async fn count_templates(&self, organisation_id: Uuid) -> Result<i64> {
        let (count,) = sqlx::query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM proposition_templates WHERE organisation_id = $1",
        )
        .bind(organisation_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    pub async fn update_template_statut(&self, id: Uuid, statut: StatutTemplate) -> Result<()> {
        sqlx::query(
            "UPDATE proposition_templates SET statut = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(statut)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // === Propositions ===

    pub async fn create_proposition(&self, proposition: &Proposition) -> Result<Proposition> {
        let creee = sqlx::query_as::<_, Proposition>(
            r#"
            INSERT INTO propositions (
                id, organisation_id, template_id, nom_client, source_documents,
                extracted_data, filled_data, statut, duplicated_template_url,
                suggestions_generees, suggestions_editees, synthese_editee,
                erreur, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING *
            "#,
        )
        .bind(proposition.id)
        .bind(proposition.organisation_id)
        .bind(proposition.template_id)
        .bind(&proposition.nom_client)
        .bind(&proposition.source_documents)
        .bind(&proposition.extracted_data)
        .bind(&proposition.filled_data)
        .bind(proposition.statut)
        .bind(&proposition.duplicated_template_url)
        .bind(&proposition.suggestions_generees)
        .bind(&proposition.suggestions_editees)
        .bind(&proposition.synthese_editee)
        .bind(&proposition.erreur)
        .bind(proposition.created_at)
        .bind(proposition.updated_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(creee)
    }

    pub async fn get_proposition(&self, id: Uuid) -> Result<Proposition> {
        let proposition = sqlx::query_as::<_, Proposition>(
            "SELECT * FROM propositions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Proposition".to_string()))?;

        Ok(proposition)
    }

    pub async fn list_propositions(
        &self,
        organisation_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Proposition>> {
        let propositions = sqlx::query_as::<_, Proposition>(
            r#"
            SELECT * FROM propositions
            WHERE organisation_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(organisation_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(propositions)
    }

    /// Réécrit les champs modifiables d'une proposition
    pub async fn update_proposition(&self, proposition: &Proposition) -> Result<Proposition> {
        let mise_a_jour = sqlx::query_as::<_, Proposition>(
            r#"
            UPDATE propositions
            SET template_id = $2,
                nom_client = $3,
                source_documents = $4,
                extracted_data = $5,
                filled_data = $6,
                statut = $7,
                duplicated_template_url = $8,
                suggestions_generees = $9,
                suggestions_editees = $10,
                synthese_editee = $11,
                erreur = $12,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(proposition.id)
        .bind(proposition.template_id)
        .bind(&proposition.nom_client)
        .bind(&proposition.source_documents)
        .bind(&proposition.extracted_data)
        .bind(&proposition.filled_data)
        .bind(proposition.statut)
        .bind(&proposition.duplicated_template_url)
        .bind(&proposition.suggestions_generees)
        .bind(&proposition.suggestions_editees)
        .bind(&proposition.synthese_editee)
        .bind(&proposition.erreur)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Proposition".to_string()))?;

        Ok(mise_a_jour)
    }

    /// Transition optimiste : ne s'applique que si l'état courant est bien
    /// le prédécesseur attendu. Retourne faux si un autre appel est passé
    /// avant (deux exports concurrents ne gagnent pas tous les deux).
    pub async fn transition_proposition(
        &self,
        id: Uuid,
        de: StatutProposition,
        vers: StatutProposition,
    ) -> Result<bool> {
        let resultat = sqlx::query(
            r#"
            UPDATE propositions
            SET statut = $3, updated_at = NOW()
            WHERE id = $1 AND statut = $2
            "#,
        )
        .bind(id)
        .bind(de)
        .bind(vers)
        .execute(&self.pool)
        .await?;

        Ok(resultat.rows_affected() == 1)
    }

    /// Enregistre l'échec d'une génération : jamais bloquée en `processing`
    pub async fn marquer_proposition_erreur(&self, id: Uuid, message: &str) -> Result<()> {
        sqlx::query(
            "UPDATE propositions SET statut = 'error', erreur = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn set_artefact_proposition(&self, id: Uuid, url: &str) -> Result<()> {
        sqlx::query(
            "UPDATE propositions SET duplicated_template_url = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(url)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Propositions au-delà des `conservees` plus récentes, candidates à la
    /// suppression par la politique de rétention
    pub async fn lister_propositions_excedentaires(
        &self,
        organisation_id: Uuid,
        conservees: i64,
    ) -> Result<Vec<Proposition>> {
        let victimes = sqlx::query_as::<_, Proposition>(
            r#"
            SELECT * FROM propositions
            WHERE organisation_id = $1
            ORDER BY created_at DESC
            OFFSET $2
            "#,
        )
        .bind(organisation_id)
        .bind(conservees)
        .fetch_all(&self.pool)
        .await?;

        Ok(victimes)
    }

    pub async fn delete_propositions(&self, ids: &[Uuid]) -> Result<u64> {
        let resultat = sqlx::query("DELETE FROM propositions WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;

        Ok(resultat.rows_affected())
    }

    // === Transactions Stripe ===

    pub async fn create_transaction(
        &self,
        transaction: &StripeTransaction,
    ) -> Result<StripeTransaction> {
        let creee = sqlx::query_as::<_, StripeTransaction>(
            r#"
            INSERT INTO stripe_transactions (
                id, organisation_id, stripe_session_id, montant,
                credits_accordes, statut, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(transaction.id)
        .bind(transaction.organisation_id)
        .bind(&transaction.stripe_session_id)
        .bind(transaction.montant)
        .bind(transaction.credits_accordes)
        .bind(transaction.statut)
        .bind(transaction.created_at)
        .bind(transaction.updated_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(creee)
    }

    pub async fn get_transaction_par_session(
        &self,
        stripe_session_id: &str,
    ) -> Result<Option<StripeTransaction>> {
        let transaction = sqlx::query_as::<_, StripeTransaction>(
            "SELECT * FROM stripe_transactions WHERE stripe_session_id = $1",
        )
        .bind(stripe_session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(transaction)
    }

    /// Change l'état d'une transaction
    ///
    /// Une transaction `succeeded` est immuable : la garde est portée par
    /// la clause WHERE, pas par une relecture applicative.
    pub async fn update_transaction_statut(
        &self,
        id: Uuid,
        statut: StatutTransaction,
    ) -> Result<StripeTransaction> {
        let mise_a_jour = sqlx::query_as::<_, StripeTransaction>(
            r#"
            UPDATE stripe_transactions
            SET statut = $2, updated_at = NOW()
            WHERE id = $1 AND statut <> 'succeeded'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(statut)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| {
            AppError::Validation("Transaction introuvable ou déjà confirmée".to_string())
        })?;

        Ok(mise_a_jour)
    }
}
