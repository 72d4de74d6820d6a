use crate::{
    api::{attendance, sessions},
    auth::middleware::auth_middleware,
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};

/// Per-IP limiter allowing `requests_per_min` with an equal burst.
fn build_limiter(requests_per_min: u32) -> Option<Governor<PeerIpKeyExtractor, NoOpMiddleware>> {
    let requests_per_min = requests_per_min.max(1);
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond((60_000 / requests_per_min as u64).max(1))
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()?;
    Some(Governor::new(&cfg))
}

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config) {
    let scope = web::scope(&config.api_prefix)
        .wrap(from_fn(auth_middleware))
        .service(
            web::scope("/attendance")
                .route("/confirm", web::post().to(attendance::confirm))
                .route("/check-out", web::post().to(attendance::check_out))
                .route("/can-confirm/{session_id}", web::get().to(attendance::can_confirm))
                .route("/today", web::get().to(attendance::today))
                .service(
                    web::scope("/break")
                        .route("/start", web::post().to(attendance::start_break))
                        .route("/end", web::post().to(attendance::end_break))
                        .route("/status", web::get().to(attendance::break_status)),
                ),
        )
        .service(
            web::scope("/sessions")
                // /sessions
                .service(
                    web::resource("")
                        .route(web::get().to(sessions::list_sessions))
                        .route(web::post().to(sessions::create_session)),
                )
                .route("/sync", web::post().to(sessions::sync_sessions))
                .route("/settings/refresh", web::post().to(sessions::refresh_settings))
                // /sessions/{id}
                .route("/{id}", web::delete().to(sessions::delete_session))
                .route("/{id}/lock", web::put().to(sessions::lock_session))
                .route("/{id}/unlock", web::put().to(sessions::unlock_session)),
        );

    // Rate limiting wraps authentication so rejected tokens still count.
    match build_limiter(config.rate_protected_per_min) {
        Some(limiter) => cfg.service(scope.wrap(limiter)),
        None => {
            tracing::warn!("Rate limiter misconfigured; serving without it");
            cfg.service(scope)
        }
    };
}
