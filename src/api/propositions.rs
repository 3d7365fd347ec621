// api/propositions.rs
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::core::generation_service::{GenerationService, MajProposition};
use crate::core::retention_service::RetentionService;
use crate::models::PaginatedResponse;
use crate::services::database::Database;
use crate::utils::error::Result;

/// Configure les routes des propositions
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/propositions")
            .route("", web::post().to(create_draft))
            .route("", web::get().to(list_propositions))
            .route("/{id}", web::get().to(get_proposition))
            .route("/{id}", web::patch().to(update_proposition))
            .route("/{id}", web::delete().to(delete_proposition))
            .route("/{id}/extraction", web::post().to(lancer_extraction))
            .route("/{id}/generation", web::post().to(generer))
            .route("/{id}/drift", web::get().to(evaluer_drift)),
    );
}

#[derive(Debug, Deserialize, Validate)]
struct CreateDraftRequest {
    organisation_id: Uuid,
    template_id: Option<Uuid>,
    #[validate(length(max = 200, message = "Le nom du client est trop long"))]
    nom_client: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    organisation_id: Uuid,
    page: Option<i64>,
    per_page: Option<i64>,
}

/// Créer un brouillon de proposition
async fn create_draft(
    generation: web::Data<GenerationService>,
    request: web::Json<CreateDraftRequest>,
) -> Result<HttpResponse> {
    request.validate()?;

    let proposition = generation
        .create_draft(
            request.organisation_id,
            request.template_id,
            request.nom_client.clone(),
        )
        .await?;

    Ok(HttpResponse::Created().json(proposition))
}

/// Obtenir une proposition
async fn get_proposition(
    db: web::Data<Database>,
    id: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let proposition = db.get_proposition(id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(proposition))
}

/// Lister les propositions d'une organisation, plus récentes d'abord
async fn list_propositions(
    db: web::Data<Database>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(20).clamp(1, 100);

    let propositions = db
        .list_propositions(query.organisation_id, per_page, (page - 1) * per_page)
        .await?;

    let total = propositions.len() as i64;
    Ok(HttpResponse::Ok().json(PaginatedResponse {
        items: propositions,
        total,
        page,
        per_page,
        total_pages: (total as f64 / per_page as f64).ceil() as i64,
    }))
}

/// Mise à jour partielle d'une proposition
async fn update_proposition(
    generation: web::Data<GenerationService>,
    id: web::Path<Uuid>,
    request: web::Json<MajProposition>,
) -> Result<HttpResponse> {
    let proposition = generation
        .update_proposition(id.into_inner(), request.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(proposition))
}

/// Suppression explicite : cascade sur tous les objets de stockage
async fn delete_proposition(
    retention: web::Data<RetentionService>,
    id: web::Path<Uuid>,
) -> Result<HttpResponse> {
    retention.supprimer_proposition(id.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Lancer l'extraction IA sur les documents sources
async fn lancer_extraction(
    generation: web::Data<GenerationService>,
    id: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let proposition = generation.lancer_extraction(id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(proposition))
}

/// Générer le document de la proposition
async fn generer(
    generation: web::Data<GenerationService>,
    id: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let resultat = generation.generate(id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(resultat))
}

/// Évaluer la dérive des suggestions éditées avant export
async fn evaluer_drift(
    generation: web::Data<GenerationService>,
    id: web::Path<Uuid>,
) -> Result<HttpResponse> {
    match generation.evaluer_drift_proposition(id.into_inner()).await? {
        Some(etat) => {
            let needs_warning = etat.needs_warning();
            Ok(HttpResponse::Ok().json(serde_json::json!({
                "etat": etat,
                "needs_warning": needs_warning,
            })))
        }
        None => Ok(HttpResponse::Ok().json(serde_json::json!({
            "etat": null,
            "needs_warning": false,
        }))),
    }
}
