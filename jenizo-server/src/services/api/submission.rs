use actix_web::web::*;

use crate::handlers::submission;

use super::RouteLimiters;

// Both forms count against the same per-IP window
pub fn configure(cfg: &mut ServiceConfig, limiters: RouteLimiters) {
    cfg.service(
        resource("/contact")
            .route(post().to(submission::contact))
            .wrap(limiters.submissions.clone()),
    )
    .service(
        resource("/inquiries")
            .route(post().to(submission::inquiry))
            .wrap(limiters.submissions),
    );
}
