use actix_web::{HttpResponse, Responder, get};

/// Liveness probe for the HTTP front end; an empty 200
#[get("/health")]
pub async fn health_route() -> impl Responder {
    HttpResponse::Ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, test as actix_test};

    #[actix_web::test]
    async fn test_health_is_empty_ok() {
        let app = actix_test::init_service(App::new().service(health_route)).await;
        let resp = actix_test::call_service(&app, actix_test::TestRequest::get().uri("/health").to_request()).await;

        assert!(resp.status().is_success());
        assert!(actix_test::read_body(resp).await.is_empty());
    }
}
