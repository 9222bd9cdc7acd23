use actix_web::{get, web, App, HttpResponse, HttpServer, Responder};
use exception_logger::telemetry::{
    self, interceptor, with_exception_logger, ExceptionLogger, LoggerConfig, OtelClientFactory,
    PendingExceptions, Properties, SeverityLevel,
};
use serde::Deserialize;
use std::env;
use tracing::info;
use tracing_actix_web::TracingLogger;

#[derive(Deserialize)]
struct HelloQuery {
    user: Option<String>,
}

#[derive(Deserialize)]
struct ReportQuery {
    message: Option<String>,
    severity: Option<String>,
}

#[get("/")]
#[tracing::instrument(skip(query), fields(user))]
async fn hello(query: web::Query<HelloQuery>) -> impl Responder {
    let user = query.user.as_deref().unwrap_or("anonymous");
    tracing::Span::current().record("user", user);
    info!(user = user, "Hello endpoint called");
    HttpResponse::Ok().body(format!("Hello, {}!", user))
}

#[get("/health")]
async fn health() -> impl Responder {
    HttpResponse::Ok().body("ok")
}

#[get("/report")]
async fn report(
    query: web::Query<ReportQuery>,
    logger: web::Data<ExceptionLogger>,
) -> impl Responder {
    let severity = match query.severity.as_deref().map(str::parse::<SeverityLevel>) {
        Some(Ok(level)) => Some(level),
        Some(Err(e)) => return HttpResponse::BadRequest().body(e.to_string()),
        None => None,
    };
    let message = query
        .message
        .clone()
        .unwrap_or_else(|| "exception reported through /report".to_string());

    telemetry::provide_async(logger.get_ref().clone(), record_report(message, severity)).await;
    HttpResponse::Accepted().finish()
}

// Reached without the logger being passed in: picks it up from the scope.
async fn record_report(message: String, severity: Option<SeverityLevel>) {
    let mut properties = Properties::new();
    properties.insert("route".to_string(), serde_json::json!("/report"));
    telemetry::current_logger().log_exception(message, severity, Some(properties));
}

#[get("/panic")]
async fn trigger_panic() -> HttpResponse {
    panic!("panic requested through /panic");
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let config = LoggerConfig::from_env().expect("Invalid exception logger configuration");
    telemetry::init_logging(&config).expect("Failed to initialize logging");

    // Panics before the client loads are buffered, not lost
    interceptor::install(PendingExceptions::global());

    let app_state = |_: (), logger: &ExceptionLogger| web::Data::new(logger.clone());
    let mounted = with_exception_logger(
        app_state,
        config.connection_string.clone(),
        Some(config.options.clone()),
    )
    .mount(OtelClientFactory)
    .expect("Failed to mount exception logger");
    let logger = mounted.render(());

    let port: u16 = env::var("PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .expect("PORT must be a number");

    info!("Starting server on port {}", port);

    HttpServer::new(move || {
        App::new()
            .app_data(logger.clone())
            .wrap(TracingLogger::default())
            .service(hello)
            .service(health)
            .service(report)
            .service(trigger_panic)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await?;

    mounted.unmount();
    Ok(())
}
