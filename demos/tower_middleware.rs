use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use category_gate::middleware::{AccessLayer, RequestExt, ACCESS_GRANTED_HEADER};
use category_gate::{AccessManager, Client};
use http::{Request, Response, StatusCode};
use http_body_util::{Empty, Full};
use tower::{ServiceBuilder, ServiceExt};

async fn handle_request(req: Request<Empty<Bytes>>) -> Result<Response<Full<Bytes>>, Infallible> {
    if req.access_granted() {
        Ok(Response::new(Full::new(Bytes::from("Welcome to the premium content"))))
    } else {
        Ok(Response::builder()
            .status(StatusCode::FORBIDDEN)
            .body(Full::new(Bytes::from("Content is hidden for your category")))
            .unwrap_or_else(|_| Response::new(Full::new(Bytes::new()))))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let manager = Arc::new(AccessManager::new(Client::builder().from_env().build()?));
    manager.initialize().await;

    let layer = AccessLayer::new(manager, "demo_feature_flag", "allowed_categories");

    for category in ["premium", "gold", "silver"] {
        let service = ServiceBuilder::new()
            .layer(layer.clone())
            .service_fn(handle_request);

        let request = Request::builder()
            .uri("/protected")
            .header("X-User-Category", category)
            .body(Empty::<Bytes>::new())?;

        let response = service.oneshot(request).await?;
        println!(
            "{}: status {} ({} = {:?})",
            category,
            response.status(),
            ACCESS_GRANTED_HEADER,
            response.headers().get(ACCESS_GRANTED_HEADER)
        );
    }

    Ok(())
}
