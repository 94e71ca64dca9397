use std::sync::Arc;

use chrono::Local;
use clap::Parser;
use serde::Serialize;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod db;
mod error;
mod ingest;
mod models;
mod news;
mod scheduler;
#[cfg(test)]
mod testing;

use cli::{Cli, CollectArgs, Command, DomainsCommand, FavouritesCommand};
use config::{require_env, Config, API_KEY_VAR, DB_HOST_VAR};
use db::{NamedTable, Repository};
use error::Result;
use ingest::{Collector, CycleReport, Target};
use models::{Article, ArticleQuery, Domain};
use news::NewsApiClient;
use scheduler::Scheduler;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    let db_host = require_env(cli.db_host, DB_HOST_VAR)?;
    let repository = Arc::new(Repository::connect(&db_host, config.db_connect_retries).await?);

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            let collector = build_collector(&config, cli.api_key, repository)?;
            let scheduler = Scheduler::new(config.jobs.clone(), collector);
            run_until_interrupted(scheduler).await;
        }
        Command::Collect(args) => {
            let collector = build_collector(&config, cli.api_key, repository)?;
            collect(&config, collector, args).await?;
        }
        Command::Articles {
            country,
            search,
            limit,
            offset,
            json,
        } => {
            let query = ArticleQuery::new(country, search);
            print_articles(&repository, &query, limit, offset, json).await?;
        }
        Command::Domains(command) => domains(&repository, command).await?,
        Command::Favourites(command) => favourites(&repository, command).await?,
    }

    Ok(())
}

fn build_collector(
    config: &Config,
    api_key: Option<String>,
    repository: Arc<Repository>,
) -> Result<Arc<Collector>> {
    let api_key = require_env(api_key, API_KEY_VAR)?;
    let client = NewsApiClient::new(
        api_key,
        &config.api_base_url,
        config.page_size,
        config.request_timeout(),
    )?;
    Ok(Arc::new(Collector::new(
        repository,
        Arc::new(client),
        config.global_language.as_str(),
    )))
}

async fn run_until_interrupted(scheduler: Scheduler) {
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown requested, waiting for running cycles"),
            Err(e) => tracing::error!(error = %e, "Unable to listen for shutdown signal"),
        }
        let _ = tx.send(true);
    });

    scheduler.run(rx).await;
}

async fn collect(config: &Config, collector: Arc<Collector>, args: CollectArgs) -> Result<()> {
    let reports = if let Some(country) = args.country {
        let target = Target::by_country(country, args.language.unwrap_or_default());
        vec![collector.collect(&target).await?]
    } else if let Some(domain) = args.domain {
        vec![collector.collect(&Target::global(domain)).await?]
    } else {
        let scheduler = Scheduler::new(config.jobs.clone(), collector);
        if args.due {
            scheduler.run_due(&Local::now().time()).await
        } else {
            scheduler.run_once(args.job.as_deref()).await?
        }
    };

    if reports.is_empty() {
        println!("Nothing collected.");
    }
    for report in &reports {
        print_report(report);
    }
    Ok(())
}

fn print_report(report: &CycleReport) {
    println!(
        "{:<28} {:>6} total ({} page(s)) {:>4} fetched {:>4} stored {:>3} skipped {:>3} failed",
        report.target,
        report.total_results,
        report.pages_available,
        report.fetched,
        report.stored,
        report.skipped,
        report.failed,
    );
}

#[derive(Serialize)]
struct ArticlePage {
    total: i64,
    offset: u32,
    articles: Vec<Article>,
}

#[derive(Serialize, Default)]
struct DomainListing {
    #[serde(skip_serializing_if = "Option::is_none")]
    favourites: Option<Vec<Domain>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    others: Option<Vec<Domain>>,
}

async fn print_articles(
    repository: &Repository,
    query: &ArticleQuery,
    limit: u32,
    offset: u32,
    json: bool,
) -> Result<()> {
    let page = ArticlePage {
        total: repository.count_articles(query).await?,
        offset,
        articles: repository.list_articles(query, limit, offset).await?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&page)?);
        return Ok(());
    }

    println!(
        "Showing {} of {} article(s) from offset {}",
        page.articles.len(),
        page.total,
        offset
    );
    for article in page.articles {
        let tag = if article.country.is_empty() {
            String::new()
        } else {
            format!("[{}] ", article.country)
        };
        println!(
            "\n{}  {}{} ({})",
            article.published_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
            tag,
            article.source,
            article.domain
        );
        println!("    {}", article.title);
        println!("    {}", article.url);
    }
    Ok(())
}

async fn domains(repository: &Repository, command: DomainsCommand) -> Result<()> {
    match command {
        DomainsCommand::List {
            favourites,
            others,
            json,
        } => {
            let (show_favourites, show_others) = match (favourites, others) {
                (false, false) => (true, true),
                flags => flags,
            };
            let mut listing = DomainListing::default();
            if show_favourites {
                listing.favourites = Some(repository.favourite_domains().await?);
            }
            if show_others {
                listing.others = Some(repository.non_favourite_domains().await?);
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&listing)?);
                return Ok(());
            }
            if let Some(domains) = listing.favourites {
                println!("Favourites ({}):", repository.count_domains(true).await?);
                for domain in domains {
                    println!("  {}", domain.name);
                }
            }
            if let Some(domains) = listing.others {
                println!("Others ({}):", repository.count_domains(false).await?);
                for domain in domains {
                    println!("  {}", domain.name);
                }
            }
        }
        DomainsCommand::Add { name } => match repository.domain_id(&name).await? {
            Some(id) => println!("Domain {name} already known (id {id})"),
            None => {
                let id = repository.insert_named(NamedTable::Domains, &name).await?;
                println!("Added domain {name} (id {id})");
            }
        },
    }
    Ok(())
}

async fn favourites(repository: &Repository, command: FavouritesCommand) -> Result<()> {
    let updated = match command {
        FavouritesCommand::Set { names } => {
            warn_unknown_domains(repository, &names).await?;
            repository.replace_favourites(names).await?
        }
        FavouritesCommand::Add { names } => {
            warn_unknown_domains(repository, &names).await?;
            repository.set_favourites(names).await?
        }
        FavouritesCommand::Clear => {
            let cleared = repository.reset_favourites().await?;
            println!("Cleared {cleared} favourite(s)");
            return Ok(());
        }
    };
    println!("{updated} domain(s) flagged as favourite");
    Ok(())
}

async fn warn_unknown_domains(repository: &Repository, names: &[String]) -> Result<()> {
    for name in names {
        if repository.domain_id(name).await?.is_none() {
            tracing::warn!(domain = %name, "Unknown domain, register it with `domains add` first");
        }
    }
    Ok(())
}
