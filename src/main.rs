//! tarot-adviser command-line entry point
//!
//! Runs one reading from the command line, or serves the HTTP API.

use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tarot_adviser::{
    adviser::{AdviseRequest, AdviserService, normalize},
    cache::InMemoryCache,
    cli::{self, Cli, Command, InputArgs, ReadArgs},
    client::{ClientError, ClientOptions, create_client},
    config::Config,
    handlers::{self, AppState},
    result::GenerationResult,
    telemetry,
    usecase::{GenerateReadingUseCase, ReadingRequest},
};

type MainResult<T> = Result<T, Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() -> MainResult<()> {
    let cli = Cli::parse();

    if let Some(Command::Config { output }) = &cli.command {
        let template = cli::generate_config_template();
        match output {
            Some(path) => {
                std::fs::write(path, template)?;
                eprintln!("Wrote configuration template to {}", path);
            }
            None => print!("{}", template),
        }
        return Ok(());
    }

    let mut config = Config::load_or_default(&cli.config)?;
    config.apply_env();

    telemetry::init(&config.observability.log_level);

    match cli.command {
        Some(Command::Read(args)) => run_read(&config, args).await,
        Some(Command::Advise(args)) => {
            let mut request = request_from(&args.input).await?;
            if args.backend.is_some() {
                request.backend = args.backend;
            }
            let adviser = AdviserService::from_config(&config);
            let result = adviser.generate(request).await;
            print_result(&result, args.input.summary)
        }
        Some(Command::Serve { host, port }) => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            serve(config).await
        }
        Some(Command::Config { .. }) | None => serve(config).await,
    }
}

/// Inline flags or `--input`, else interactive prompts on stdin
async fn request_from(input: &InputArgs) -> MainResult<AdviseRequest> {
    if let Some(request) = input.to_request()? {
        return Ok(request);
    }
    let request = tokio::task::spawn_blocking(|| {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        cli::prompt_interactive(&mut stdin.lock(), &mut stdout)
    })
    .await??;
    Ok(input.apply_overrides(request))
}

/// Drive the generation use case directly; exits 1 on failure
async fn run_read(config: &Config, args: ReadArgs) -> MainResult<()> {
    let request = request_from(&args.input).await?;
    let normalized = normalize(request, &config.request_defaults());
    let locale = normalized.locale.clone();

    let options = ClientOptions {
        api_key: Some(normalized.credentials.key.clone()).filter(|k| !k.is_empty()),
        model: normalized.credentials.model.clone(),
        base_url: config.openai.base_url.clone(),
        temperature: config.openai.temperature,
        locale: locale.clone(),
        stub_mode: args.mode.into(),
    };

    let outcome: Result<GenerationResult, ClientError> = async {
        let client = create_client(args.backend.as_str(), options)?;
        let usecase = GenerateReadingUseCase::new(client, Arc::new(InMemoryCache::new()))
            .with_locale(locale);
        usecase.execute(&ReadingRequest::from(normalized)).await
    }
    .await;

    match outcome {
        Ok(result) => print_result(&result, args.input.summary),
        Err(e) => {
            tracing::error!(error = %e, code = %e.code(), "Reading generation failed");
            eprintln!("[ERROR] {}", e);
            std::process::exit(1);
        }
    }
}

fn print_result(result: &GenerationResult, summary_only: bool) -> MainResult<()> {
    if summary_only {
        let summary = match (result.reading(), result.error()) {
            (Some(reading), _) => reading.summary.as_str(),
            (None, Some(error)) => error.message.as_str(),
            (None, None) => "",
        };
        println!("{}", summary);
    } else {
        println!("{}", serde_json::to_string_pretty(result)?);
    }
    Ok(())
}

async fn serve(config: Config) -> MainResult<()> {
    tracing::info!(
        "Starting tarot-adviser server on {}:{}",
        config.server.host,
        config.server.port
    );

    let addr = SocketAddr::from((
        config
            .server
            .host
            .parse::<std::net::IpAddr>()
            .unwrap_or_else(|_| std::net::IpAddr::from([127, 0, 0, 1])),
        config.server.port,
    ));

    let app = handlers::app(AppState::new(config)?);

    tracing::info!("Listening on {}", addr);
    tracing::info!("Readings available at http://{}/v1/readings", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
