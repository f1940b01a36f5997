//! A small authenticated endpoint.
//!
//! Run with `cargo run --example auth_server`, then:
//!
//! ```text
//! curl -u alice:secret http://localhost:8080/whoami
//! curl http://localhost:8080/whoami          # 401 with a challenge
//! ```

use serde_json::json;

use chassis_core::logging::{LogConfig, LogLevel};
use chassis_core::providers::basic_auth::Credentials;
use chassis_core::{
    Application, CallArgs, Endpoint, Error, ServerConfig, bind, handler,
};

#[tokio::main]
async fn main() -> Result<(), Error> {
    LogConfig::new().level(LogLevel::Debug).init()?;

    let mut app = Application::new(ServerConfig::default())?;
    let registry = app.registry().clone();

    app.at(
        "/whoami",
        Endpoint::new().get(bind(&registry, "basic_auth").wrap(handler(
            |args: CallArgs| async move {
                let creds = args
                    .get::<Option<Credentials>>("basic_auth")
                    .ok_or_else(|| Error::Internal("missing basic_auth slot".into()))?;
                match &*creds {
                    Some(creds) => Ok(json!({"user": creds.username})),
                    None => Err(Error::Unauthorized(
                        "No basic authentication headers.".to_string(),
                    )),
                }
            },
        ))),
    )?;

    app.listen().await
}
