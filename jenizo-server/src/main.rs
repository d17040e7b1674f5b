use jenizo_common::db::UserStore;
use jenizo_common::email::ProviderHandle;

use actix_web::middleware::DefaultHeaders;
use actix_web::web::Data;
use actix_web::{App, HttpServer};
use flexi_logger::{Age, Cleanup, Criterion, Duplicate, FileSpec, Logger, Naming, WriteMode};

mod env;
mod handlers;
mod middleware;
mod services;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let mut port: Option<u16> = None;
    let mut env_file_path: Option<String> = None;

    let mut args = std::env::args();

    // Eat the first argument, which is the relative path to the executable
    args.next();

    while let Some(arg) = args.next() {
        match arg.to_lowercase().as_str() {
            "--port" => {
                let port_str = {
                    let next_arg = args.next();

                    match next_arg {
                        Some(s) => s,
                        None => {
                            eprintln!("ERROR: --port option specified but no port was given");
                            std::process::exit(1);
                        }
                    }
                };

                port = {
                    let port_result = port_str.parse::<u16>();

                    match port_result {
                        Ok(p) => Some(p),
                        Err(_) => {
                            eprintln!("ERROR: Incorrect format for port. Integer expected");
                            std::process::exit(1);
                        }
                    }
                };

                continue;
            }
            "--env-file" => {
                env_file_path = {
                    let next_arg = args.next();

                    match next_arg {
                        Some(p) => Some(p),
                        None => {
                            eprintln!(
                                "ERROR: --env-file option specified but no file path was given",
                            );
                            std::process::exit(1);
                        }
                    }
                };

                continue;
            }
            a => {
                eprintln!("ERROR: Invalid argument: {}", &a);
                std::process::exit(1);
            }
        }
    }

    // Must happen before the config is first read
    match env_file_path {
        Some(path) => {
            if let Err(e) = dotenvy::from_filename(&path) {
                eprintln!("ERROR: Failed to load env file '{path}': {e}");
                std::process::exit(1);
            }
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }

    let _logger = Logger::try_with_str(&env::CONF.log_level)
        .expect(
            "Invalid log level. Options: ERROR, WARN, INFO, DEBUG, TRACE. \
             Example: `info, jenizo_common::email=debug`",
        )
        .log_to_file(FileSpec::default().directory(&env::CONF.log_dir))
        .rotate(
            Criterion::Age(Age::Day),
            Naming::Timestamps,
            Cleanup::KeepLogAndCompressedFiles(60, 365),
        )
        .cleanup_in_background_thread(true)
        .duplicate_to_stdout(Duplicate::All)
        .write_mode(WriteMode::Async)
        .format(|writer, now, record| {
            write!(
                writer,
                "{:5} | {} | {}:{} | {}",
                record.level(),
                now.format("%Y-%m-%dT%H:%M:%S%.6fZ"),
                record.module_path().unwrap_or("<unknown>"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .use_utc()
        .start()
        .expect("Failed to start logger");

    let port = port.unwrap_or(env::CONF.port);
    let base_addr = (env::CONF.bind_addr.as_str(), port);

    log::info!("Starting in {} mode", env::CONF.run_mode.as_str());

    if env::CONF.allowed_origins.is_empty() {
        log::warn!("No allowed origins configured; all cross-origin requests will be rejected");
    } else {
        log::info!("Allowed origins: {}", env::CONF.allowed_origins.join(", "));
    }

    let provider = ProviderHandle::initialize(&env::CONF.mail);
    let user_store = UserStore::new();
    log::warn!("User accounts are kept in memory only and will be lost on restart");
    let limiters = services::api::RouteLimiters::default();

    log::info!("Listening on {}:{}", base_addr.0, base_addr.1);

    HttpServer::new(move || {
        App::new()
            .app_data(Data::new(provider.clone()))
            .app_data(Data::new(user_store.clone()))
            .configure(|cfg| services::api::configure(cfg, limiters.clone()))
            .configure(services::web::configure)
            .wrap(middleware::CorsMiddleware::default())
            .wrap(
                DefaultHeaders::new()
                    .add(("X-Content-Type-Options", "nosniff"))
                    .add(("X-Frame-Options", "DENY"))
                    .add(("Referrer-Policy", "no-referrer"))
                    .add(("Cross-Origin-Resource-Policy", "same-origin"))
                    .add((
                        "Strict-Transport-Security",
                        "max-age=15552000; includeSubDomains",
                    ))
                    .add(("Content-Security-Policy", "default-src 'none'")),
            )
            .wrap(actix_web::middleware::Logger::default())
    })
    .workers(env::CONF.actix_worker_count)
    .bind(base_addr)?
    .run()
    .await?;

    // Safe because all other threads have been joined
    unsafe {
        env::CONF.zeroize();
    }

    Ok(())
}
