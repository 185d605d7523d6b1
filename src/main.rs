use api::{Bot, Coordinator, Courier, Library, Settings, VerifyingKey};
use core::{convert::Infallible, num::NonZeroU64, pin::pin, str::FromStr, time::Duration};
use db::{Config, Database, NoTls};
use http_body_util::Full;
use hyper::{
    body::{Bytes, Incoming},
    server::conn::http1,
    service::service_fn,
    Method, Request, Response,
};
use hyper_util::rt::TokioIo;
use std::{
    env,
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
};
use tokio::{net::TcpListener, runtime::Runtime, signal};

/// Reads an optional numeric override from the environment.
fn var_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => Ok(value.parse()?),
        Err(_) => Ok(default),
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    // Parse environment variables
    let port = env::var("PORT")?.parse()?;
    let token = env::var("TOKEN")?;
    let app = env::var("APP_ID")?.parse()?;
    let database_url = env::var("DATABASE_URL")?;
    let quiz_dir = env::var("QUIZ_DIR").unwrap_or_else(|_| String::from("quizzes"));
    let admins = match env::var("ADMINS") {
        Ok(admins) => admins.split(',').map(str::trim).map(str::parse).collect::<Result<Vec<NonZeroU64>, _>>()?,
        _ => Vec::new(),
    };

    let public: [u8; 32] = hex::decode(env::var("PUBLIC_KEY")?)?
        .try_into()
        .map_err(|_| anyhow::anyhow!("public key must be 32 bytes long"))?;
    let public = VerifyingKey::from_bytes(&public)?;

    let defaults = Settings::default();
    let settings = Settings {
        send_workers: var_or("SEND_WORKERS", defaults.send_workers)?,
        delete_workers: var_or("DELETE_WORKERS", defaults.delete_workers)?,
        decay: var_or("DECAY_RATE", defaults.decay)?,
        cleanup_grace: Duration::from_secs(var_or("CLEANUP_GRACE", defaults.cleanup_grace.as_secs())?),
        ..defaults
    };

    let library = Library::load_dir(&quiz_dir)?;
    log::info!("loaded {} quizzes from {quiz_dir}", library.len());

    let runtime = Runtime::new()?;
    runtime.block_on(async move {
        // Connect to the database
        let config: Config = database_url.parse()?;
        let (client, conn) = config.connect(NoTls).await?;
        tokio::spawn(async move {
            if let Err(err) = conn.await {
                log::error!("database connection closed: {err}");
            }
        });
        let db = Database::from(client);
        db.init_schema().await.map_err(|err| anyhow::anyhow!("cannot initialize the schema: {err}"))?;

        // Initialize service handler
        let courier = Arc::new(Courier::new(token, app));
        let coordinator = Coordinator::new(Arc::clone(&courier), db, library, settings);
        let bot = Arc::new(Bot::new(Arc::new(coordinator), courier, admins));

        let addr: SocketAddr = (Ipv4Addr::UNSPECIFIED, port).into();
        let listener = TcpListener::bind(addr).await?;
        log::info!("listening for interactions on {addr}");

        let mut stop = pin!(signal::ctrl_c());
        loop {
            let (stream, peer) = tokio::select! {
                biased;
                res = &mut stop => {
                    res?;
                    break;
                }
                res = listener.accept() => res?,
            };

            let bot = Arc::clone(&bot);
            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let bot = Arc::clone(&bot);
                    async move {
                        // For now, we only allow requests from the root endpoint.
                        if req.method() != Method::POST || req.uri().path() != "/" {
                            let mut res = Response::new(Full::new(Bytes::new()));
                            *res.status_mut() = hyper::StatusCode::NOT_FOUND;
                            return Ok::<_, Infallible>(res);
                        }

                        let (parts, body) = req.into_parts();
                        Ok(match api::interaction::try_respond(body, &parts.headers, &*bot, &public).await {
                            Ok(res) => res,
                            Err(code) => {
                                let mut res = Response::new(Full::new(Bytes::new()));
                                *res.status_mut() = code;
                                res
                            }
                        })
                    }
                });
                if let Err(err) = http1::Builder::new().serve_connection(TokioIo::new(stream), service).await {
                    log::error!("connection with {peer} failed: {err}");
                }
            });
        }

        log::info!("shutting down");
        anyhow::Ok(())
    })
}
