use acme_ingress_solver::{Certificate, IngressSolver, KubeIngressStore, SolverConfiguration};
use clap::{Parser, Subcommand};
use futures::future;
use kube::{Api, Client, ResourceExt};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    Layer, Registry,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct CommandArgs {
    #[arg(long)]
    with_config_file: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Route the challenge path for a token on a domain to the solver service.
    Ensure {
        #[arg(long)]
        namespace: String,
        #[arg(long)]
        certificate: String,
        #[arg(long)]
        domain: String,
        #[arg(long)]
        service: String,
        #[arg(long)]
        token: String,
    },
    /// Remove what `ensure` set up for a token on a domain.
    Cleanup {
        #[arg(long)]
        namespace: String,
        #[arg(long)]
        certificate: String,
        #[arg(long)]
        domain: String,
        #[arg(long)]
        token: String,
    },
    /// List the dedicated solver ingresses of a certificate, per domain.
    Find {
        #[arg(long)]
        namespace: String,
        #[arg(long)]
        certificate: String,
        #[arg(long, required = true)]
        domain: Vec<String>,
    },
}

fn init_tracing_logging() -> WorkerGuard {
    let file_appender = tracing_appender::rolling::never(".", "acme-ingress-solver.log");
    let (non_blocking_appender, guard) = tracing_appender::non_blocking(file_appender);
    let file_filter = tracing_subscriber::EnvFilter::new(std::env::var("RUST_FILE_LOG").unwrap_or_else(|_| "debug".to_owned()));
    let console_filter = tracing_subscriber::EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_owned()));

    let console_layer = fmt::layer()
        .event_format(fmt::format().compact())
        .with_target(true)
        .with_span_events(FmtSpan::NONE)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .with_filter(filter::filter_fn(|meta| !meta.is_span()))
        .with_filter(console_filter);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_appender)
        .with_span_events(FmtSpan::NONE)
        .with_target(true)
        .with_ansi(false)
        .with_filter(filter::filter_fn(|meta| !meta.is_span()))
        .with_filter(file_filter);

    Registry::default().with(console_layer).with(file_layer).init();
    guard
}

fn load_configuration(path: Option<&str>) -> acme_ingress_solver::Result<SolverConfiguration> {
    let configuration: SolverConfiguration = match path {
        Some(path) => serde_yaml::from_str(&std::fs::read_to_string(path)?)?,
        None => SolverConfiguration::default(),
    };
    configuration.validate()?;
    Ok(configuration)
}

#[allow(clippy::print_stdout)]
#[tokio::main(flavor = "multi_thread")]
async fn main() -> acme_ingress_solver::Result<()> {
    let args = CommandArgs::parse();
    let _guard = init_tracing_logging();
    let configuration = load_configuration(args.with_config_file.as_deref())?;
    info!("Starting with {configuration:?}");

    let client = Client::try_default().await?;
    let solver = IngressSolver::builder().store(KubeIngressStore::new(client.clone())).configuration(configuration).build();

    match args.command {
        Command::Ensure { namespace, certificate, domain, service, token } => {
            let certificate = Api::<Certificate>::namespaced(client, &namespace).get(&certificate).await?;
            let ingress = solver.ensure_ingress(&certificate, &service, &domain, &token).await?;
            println!("{}", ingress.name_any());
        },
        Command::Cleanup { namespace, certificate, domain, token } => {
            let certificate = Api::<Certificate>::namespaced(client, &namespace).get(&certificate).await?;
            solver.cleanup_ingresses(&certificate, &domain, &token).await?;
        },
        Command::Find { namespace, certificate, domain } => {
            let certificate = Api::<Certificate>::namespaced(client, &namespace).get(&certificate).await?;
            let found = future::try_join_all(domain.iter().map(|domain| solver.find_ingresses(&certificate, domain))).await?;
            for (domain, ingresses) in domain.iter().zip(found) {
                for ingress in ingresses {
                    println!("{domain} {}", ingress.name_any());
                }
            }
        },
    }
    Ok(())
}
