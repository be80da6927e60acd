//! Tutorial server exercising the framework surface: routing, path params,
//! query/header/cookie access, form and multipart bodies, JSON, downloads,
//! route groups, and the error handler.
//!
//! Run with `cargo run --example hello_world`, then e.g.:
//!
//! ```text
//! curl 'http://127.0.0.1:8080/hello?name=Hanafi'
//! curl -X POST -H 'Content-Type: application/json' \
//!      -d '{"username":"hanafi","password":"adhi"}' http://127.0.0.1:8080/login
//! ```

use serde::Deserialize;
use skiff::{App, Context, Response, StatusCode};

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    #[allow(dead_code)]
    password: String,
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    #[allow(dead_code)]
    username: String,
    #[allow(dead_code)]
    password: String,
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut app = App::new();

    app.wrap(skiff::middleware::LoggerMiddleware);

    app.on_error(|err| {
        Response::new(StatusCode::InternalServerError).body(format!("Error {err}"))
    });

    app.get("/", |ctx: Context| async move { ctx.send_text("Hello World") });

    app.get("/hello", |ctx: Context| async move {
        let name = ctx.query("name", "Guest").to_owned();
        ctx.send_text(format!("Hello {name}"))
    });

    app.get("/request", |ctx: Context| async move {
        let first_name = ctx.header("firstname").to_owned();
        let last_name = ctx.cookie("lastname").to_owned();
        ctx.send_text(format!("Hello {first_name} {last_name}"))
    });

    app.get("/user/:userId/order/:orderId", |ctx: Context| async move {
        let user_id = ctx.param("userId").to_owned();
        let order_id = ctx.param("orderId").to_owned();
        ctx.send_text(format!("Get Order {order_id} From User {user_id}"))
    });

    app.post("/hello", |ctx: Context| async move {
        let name = ctx.form_value("name");
        ctx.send_text(format!("Hello {name}"))
    });

    app.post("/upload", |ctx: Context| async move {
        let file = ctx.form_file("image").await?;
        file.save(std::env::temp_dir().join(file.filename())).await?;
        ctx.send_text("Upload Success")
    });

    app.post("/login", |ctx: Context| async move {
        let body: LoginRequest = ctx.json()?;
        ctx.send_text(format!("Login Success {}", body.username))
    });

    app.post("/register", |ctx: Context| async move {
        let body: RegisterRequest = ctx.body_parser().await?;
        ctx.send_text(format!("Register Success {}", body.name))
    });

    app.get("/user", |ctx: Context| async move {
        ctx.send_json(&serde_json::json!({
            "username": "hanafi",
            "password": "adhi",
        }))
    });

    app.get("/download", |ctx: Context| async move {
        ctx.download("./demos/assets/dahlah.txt", "contoh.txt").await
    });

    {
        let mut api = app.group("/api");
        api.get("/hello", |ctx: Context| async move { ctx.send_text("Hello World") });
        api.get("/world", |ctx: Context| async move { ctx.send_text("Hello World") });
    }
    {
        let mut web = app.group("/web");
        web.get("/hello", |ctx: Context| async move { ctx.send_text("Hello World") });
        web.get("/world", |ctx: Context| async move { ctx.send_text("Hello World") });
    }

    app.get("/error", |_ctx: Context| async move {
        Err::<Response, _>(skiff::Error::msg("Ups"))
    });

    println!("Listening on http://127.0.0.1:8080");
    app.listen("127.0.0.1:8080").await?;
    Ok(())
}
