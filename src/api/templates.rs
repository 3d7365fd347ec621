// api/templates.rs
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures_util::TryStreamExt;
use serde::Deserialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::core::filler::filler_pour;
use crate::models::{
    FileConfig, PropositionTemplate, StatutTemplate, TEMPLATES_MAX_PAR_ORGANISATION,
};
use crate::services::database::Database;
use crate::services::storage::Storage;
use crate::utils::error::{AppError, Result};

/// Configure les routes des templates
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/templates")
            .route("", web::post().to(create_template))
            .route("/{id}", web::get().to(get_template))
            .route("/{id}/test", web::post().to(tester_template))
            .route("/{id}/activer", web::post().to(activer_template))
            .route("/{id}/import", web::post().to(importer_template)),
    );
}

#[derive(Debug, Deserialize)]
struct MetadonneesTemplate {
    organisation_id: Option<Uuid>,
    nom: String,
    file_config: FileConfig,
}

#[derive(Debug, Deserialize)]
struct ImportRequest {
    organisation_id: Uuid,
}

/// Créer un template : métadonnées JSON + binaire du gabarit en multipart
///
/// Le format déclaré est porté par le discriminant de la configuration,
/// l'invariant forme/format tient donc par construction. La limite de
/// 3 templates par organisation est vérifiée avant toute écriture.
async fn create_template(
    db: web::Data<Database>,
    storage: web::Data<Storage>,
    mut payload: Multipart,
) -> Result<HttpResponse> {
    let mut metadonnees: Option<MetadonneesTemplate> = None;
    let mut binaire: Vec<u8> = Vec::new();

    while let Some(mut champ) = payload
        .try_next()
        .await
        .map_err(|e| AppError::Validation(e.to_string()))?
    {
        let nom_champ = champ
            .content_disposition()
            .and_then(|cd| cd.get_name())
            .unwrap_or("")
            .to_string();

        let mut contenu = Vec::new();
        while let Some(fragment) = champ
            .try_next()
            .await
            .map_err(|e| AppError::Validation(e.to_string()))?
        {
            contenu.extend_from_slice(&fragment);
        }

        match nom_champ.as_str() {
            "metadata" => {
                metadonnees = Some(serde_json::from_slice(&contenu)?);
            }
            "fichier" => {
                binaire = contenu;
            }
            autre => {
                return Err(AppError::Validation(format!(
                    "champ multipart inattendu: {}",
                    autre
                )));
            }
        }
    }

    let metadonnees =
        metadonnees.ok_or_else(|| AppError::Validation("métadonnées manquantes".to_string()))?;
    if binaire.is_empty() {
        return Err(AppError::Validation("binaire du gabarit manquant".to_string()));
    }

    if let Some(organisation_id) = metadonnees.organisation_id {
        let existants = db.count_templates(organisation_id).await?;
        if existants >= TEMPLATES_MAX_PAR_ORGANISATION {
            return Err(AppError::TemplateLimitReached);
        }
    }

    let file_type = metadonnees.file_config.file_type();
    let id = Uuid::new_v4();
    let chemin = format!("templates/{}/gabarit.{}", id, file_type.extension());
    storage.upload(&chemin, &binaire, file_type.content_type()).await?;

    let mut template = PropositionTemplate::new(
        metadonnees.organisation_id,
        metadonnees.nom,
        file_type,
        metadonnees.file_config,
        chemin,
    );
    template.id = id;

    let cree = db.create_template(&template).await?;
    Ok(HttpResponse::Created().json(cree))
}

/// Obtenir un template
async fn get_template(db: web::Data<Database>, id: web::Path<Uuid>) -> Result<HttpResponse> {
    let template = db.get_template(id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(template))
}

/// Tester un template : remplissage d'essai avec des valeurs d'exemple
///
/// C'est ici qu'un gabarit inutilisable (PDF sans formulaire, feuille
/// introuvable) est détecté, plutôt qu'à la première génération d'un
/// client. Le rendu d'essai n'est pas persisté.
async fn tester_template(
    db: web::Data<Database>,
    storage: web::Data<Storage>,
    id: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let template = db.get_template(id.into_inner()).await?;

    if !template.file_config.0.correspond(template.file_type) {
        return Err(AppError::ConfigMismatch {
            attendu: template.file_type.as_str().to_string(),
            recu: template.file_config.0.file_type().as_str().to_string(),
        });
    }

    let gabarit = storage.download(&template.fichier_url).await?;

    let mut donnees_essai: Map<String, Value> = Map::new();
    for cle in template.file_config.0.cles_champs() {
        donnees_essai.insert(cle.to_string(), Value::String(format!("exemple_{}", cle)));
    }

    let filler = filler_pour(&template.file_config.0);
    let rendu = tokio::task::spawn_blocking(move || filler.fill(&gabarit, &donnees_essai))
        .await
        .map_err(|e| AppError::Generation {
            message: "Le test du template a échoué".to_string(),
            details: e.to_string(),
        })?
        .map_err(AppError::from)?;

    db.update_template_statut(template.id, StatutTemplate::Teste).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "statut": StatutTemplate::Teste,
        "avertissements": rendu.avertissements,
    })))
}

/// Activer un template testé
async fn activer_template(db: web::Data<Database>, id: web::Path<Uuid>) -> Result<HttpResponse> {
    let template = db.get_template(id.into_inner()).await?;

    if template.statut != StatutTemplate::Teste {
        return Err(AppError::Validation(
            "seul un template testé peut être activé".to_string(),
        ));
    }

    db.update_template_statut(template.id, StatutTemplate::Actif).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "statut": StatutTemplate::Actif })))
}

/// Importer un template global dans une organisation
///
/// Crée une copie possédée par l'organisation, qui compte dans sa limite ;
/// le binaire du gabarit est partagé.
async fn importer_template(
    db: web::Data<Database>,
    id: web::Path<Uuid>,
    request: web::Json<ImportRequest>,
) -> Result<HttpResponse> {
    let modele = db.get_template(id.into_inner()).await?;

    if !modele.est_global() {
        return Err(AppError::Validation(
            "seul un template global peut être importé".to_string(),
        ));
    }

    let existants = db.count_templates(request.organisation_id).await?;
    if existants >= TEMPLATES_MAX_PAR_ORGANISATION {
        return Err(AppError::TemplateLimitReached);
    }

    let copie = PropositionTemplate::new(
        Some(request.organisation_id),
        modele.nom.clone(),
        modele.file_type,
        modele.file_config.0.clone(),
        modele.fichier_url.clone(),
    );

    let creee = db.create_template(&copie).await?;
    Ok(HttpResponse::Created().json(creee))
}
