use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use std::env;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use proposition_platform::core::extraction::{Extractor, HttpExtractor};
use proposition_platform::core::generation_service::GenerationService;
use proposition_platform::core::ledger_service::LedgerService;
use proposition_platform::core::retention_service::RetentionService;
use proposition_platform::services::database::Database;
use proposition_platform::services::storage::Storage;
use proposition_platform::utils::config::Config;
use proposition_platform::api;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialisation du logging
    setup_tracing();
    info!("🚀 Démarrage de Proposition Platform Backend");

    // Chargement de la configuration
    let config = Config::from_env().expect("❌ Impossible de charger la configuration");
    info!("✅ Configuration chargée avec succès");
    info!("🔧 Mode: {}", config.run_mode);

    // Initialisation des services
    let db = Arc::new(
        Database::new(&config.database_url, config.database_max_connections)
            .await
            .expect("❌ Impossible de se connecter à la base de données"),
    );

    db.migrate()
        .await
        .expect("❌ Impossible d'appliquer les migrations");

    let storage = Arc::new(Storage::new(
        config.minio_endpoint.as_deref(),
        config.minio_access_key.as_deref(),
        config.minio_secret_key.as_deref(),
        &config.minio_region,
        &config.minio_bucket,
        Path::new(&config.local_storage_dir),
        config.max_file_size_mb,
    ));

    let endpoint_extraction = config
        .extraction_endpoint
        .clone()
        .unwrap_or_else(|| "http://localhost:8100/extract".to_string());
    let extracteur: Arc<dyn Extractor> = Arc::new(
        HttpExtractor::new(
            endpoint_extraction,
            config.extraction_api_key.clone(),
            config.extraction_timeout_seconds,
        )
        .expect("❌ Impossible d'initialiser le client d'extraction"),
    );

    let ledger = Arc::new(LedgerService::new(db.clone()));
    let retention = Arc::new(RetentionService::new(db.clone(), storage.clone()));
    let generation = Arc::new(GenerationService::new(
        db.clone(),
        storage.clone(),
        ledger.clone(),
        retention.clone(),
        extracteur,
        config.propositions_conservees,
        config.generation_timeout_seconds,
        config.extraction_model.clone(),
    ));

    // État partagé de l'application
    let donnees_db = web::Data::from(db);
    let donnees_storage = web::Data::from(storage);
    let donnees_ledger = web::Data::from(ledger);
    let donnees_retention = web::Data::from(retention);
    let donnees_generation = web::Data::from(generation);
    let donnees_config = web::Data::new(config.clone());

    // Configuration du serveur Actix-Web
    let adresse = format!("{}:{}", config.server_host, config.server_port);
    let workers = config.workers;

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .app_data(donnees_db.clone())
            .app_data(donnees_storage.clone())
            .app_data(donnees_ledger.clone())
            .app_data(donnees_retention.clone())
            .app_data(donnees_generation.clone())
            .app_data(donnees_config.clone())
            .configure(api::config)
            .default_service(
                web::route().to(|| async { "🚀 Proposition Platform Backend est en cours d'exécution!" }),
            )
    })
    .bind(&adresse)?
    .workers(workers)
    .shutdown_timeout(10);

    info!("✅ Backend démarré avec succès!");
    info!("🔗 API disponible sur http://{}", adresse);

    server.run().await
}

/// Configure le tracing pour le logging structuré
fn setup_tracing() {
    let log_level = env::var("LOG_LEVEL")
        .unwrap_or_else(|_| "info".into())
        .parse()
        .unwrap_or(tracing::Level::INFO);

    let log_format = env::var("LOG_FORMAT").unwrap_or_else(|_| "compact".into());

    let subscriber = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(log_level.into()),
        )
        .with(if log_format == "json" {
            Box::new(
                tracing_subscriber::fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(true)
                    .with_span_list(true),
            ) as Box<dyn tracing_subscriber::Layer<_> + Send + Sync>
        } else {
            Box::new(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_line_number(true)
                    .with_file(true),
            ) as Box<dyn tracing_subscriber::Layer<_> + Send + Sync>
        });

    subscriber.init();
}
