use api::routes::AppState;
use config::{ApiConfig, LoggingConfig};
use database::{
    PgConversationRepository, PgFollowUpRepository, PgMedicalHistoryRepository,
    PgMessageRepository, PgNoteRepository, PgPatientRepository, PgPrescriptionRepository,
    PgSummaryRepository, PgUserRepository,
};
use providers::realtime::RealtimeEndpoint;
use providers::{ChatClient, SpeechClient};
use services::actions::ActionService;
use services::auth::AuthService;
use services::commands::LlmCommandDetector;
use services::coordinator::{ConversationCoordinator, CoordinatorDeps};
use services::language::LlmLanguageService;
use services::speech::OpenAiSpeechSynthesizer;
use services::summarize::LlmSummarizer;
use services::transcode::Transcoder;
use services::{CommandService, NotificationHub, TranscriptPipeline};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Load configuration first to get logging settings
    let config = ApiConfig::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {}", e);
        eprintln!("Application cannot start without a valid configuration.");
        std::process::exit(1);
    });

    init_tracing(&config.logging);

    // A panicking task must never take the process down with it
    std::panic::set_hook(Box::new(|info| {
        tracing::error!("Unhandled panic: {info}");
    }));

    let bind_address = format!("{}:{}", config.server.host, config.server.port);

    let database = database::Database::from_config(&config.database)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Failed to connect to database: {e}");
            std::process::exit(1);
        });

    if let Err(e) = database.run_migrations().await {
        tracing::error!("Failed to run migrations: {e}");
        std::process::exit(1);
    }

    let pool = database.pool().clone();

    // Repository instances behind the service ports
    let users = Arc::new(PgUserRepository::new(pool.clone()))
        as Arc<dyn services::auth::UserRepository>;
    let patients = Arc::new(PgPatientRepository::new(pool.clone()))
        as Arc<dyn services::patients::PatientRepository>;
    let conversations = Arc::new(PgConversationRepository::new(pool.clone()))
        as Arc<dyn services::conversations::ConversationRepository>;
    let messages = Arc::new(PgMessageRepository::new(pool.clone()))
        as Arc<dyn services::conversations::MessageRepository>;
    let notes = Arc::new(PgNoteRepository::new(pool.clone()))
        as Arc<dyn services::actions::NoteRepository>;
    let follow_ups = Arc::new(PgFollowUpRepository::new(pool.clone()))
        as Arc<dyn services::actions::FollowUpRepository>;
    let prescriptions = Arc::new(PgPrescriptionRepository::new(pool.clone()))
        as Arc<dyn services::actions::PrescriptionRepository>;
    let summaries = Arc::new(PgSummaryRepository::new(pool.clone()))
        as Arc<dyn services::actions::SummaryRepository>;
    let medical_histories = Arc::new(PgMedicalHistoryRepository::new(pool.clone()))
        as Arc<dyn services::actions::MedicalHistoryRepository>;

    // Upstream provider clients; the key is injected here once
    let chat = Arc::new(ChatClient::new(
        config.openai.api_base.clone(),
        config.openai.api_key.clone(),
    ));
    let speech = Arc::new(SpeechClient::new(
        config.openai.api_base.clone(),
        config.openai.api_key.clone(),
    ));
    let endpoint = RealtimeEndpoint::new(
        config.openai.realtime_url.clone(),
        config.openai.api_key.clone(),
    );

    let hub = Arc::new(NotificationHub::new());

    let language = Arc::new(LlmLanguageService::new(
        chat.clone(),
        config.openai.chat_model.clone(),
    )) as Arc<dyn services::language::LanguageService>;
    let synthesizer = Arc::new(OpenAiSpeechSynthesizer::new(
        speech,
        config.openai.tts_model.clone(),
        config.openai.tts_voice.clone(),
    )) as Arc<dyn services::speech::SpeechSynthesizer>;
    let detector = Arc::new(LlmCommandDetector::new(
        chat.clone(),
        config.openai.chat_model.clone(),
    )) as Arc<dyn services::commands::CommandDetector>;
    let summarizer = Arc::new(LlmSummarizer::new(
        chat,
        config.openai.chat_model.clone(),
    )) as Arc<dyn services::summarize::Summarizer>;

    let commands = Arc::new(CommandService::new(
        notes.clone(),
        follow_ups.clone(),
        prescriptions.clone(),
        hub.clone(),
    ));

    let pipeline = Arc::new(TranscriptPipeline::new(
        conversations.clone(),
        messages.clone(),
        language,
        synthesizer,
        detector,
        commands,
        hub.clone(),
    ));

    let actions = Arc::new(ActionService::new(
        notes.clone(),
        follow_ups.clone(),
        prescriptions.clone(),
    ));

    let coordinator = Arc::new(ConversationCoordinator::new(CoordinatorDeps {
        conversations,
        messages,
        patients,
        notes,
        follow_ups,
        prescriptions,
        summaries,
        medical_histories,
        summarizer,
        actions,
        pipeline,
        hub,
        endpoint,
        transcription_model: config.openai.transcription_model.clone(),
        transcoder: Arc::new(Transcoder::new(&config.transcode)),
    }));

    let auth = Arc::new(AuthService::new(
        users,
        config.auth.jwt_secret.clone(),
        config.auth.access_token_ttl_hours,
        config.auth.refresh_token_ttl_hours,
    ));

    let app = api::build_router(AppState { coordinator, auth });

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Failed to bind {bind_address}: {e}");
            std::process::exit(1);
        });

    tracing::info!(address = %bind_address, "Server started successfully");

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server exited with error: {e}");
    }
}

fn init_tracing(logging_config: &LoggingConfig) {
    // Build the filter string from the logging configuration
    let mut filter = logging_config.level.clone();

    for (module, level) in &logging_config.modules {
        filter.push_str(&format!(",{}={}", module, level));
    }

    // Initialize tracing based on the format specified in config
    match logging_config.format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        }
        "compact" => {
            tracing_subscriber::fmt()
                .compact()
                .with_env_filter(filter)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .pretty()
                .with_env_filter(filter)
                .init();
        }
    }
}
