use std::io::{BufRead, Write};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use kvindex::{
    cli::{Cli, Command, QueryArgs},
    error::Result,
    record,
    retriever::{EncoderProvider, NoDenseEncoders, Retriever},
    server::{AppState, serve},
};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("KVINDEX_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    // Embedding models are deployment-specific; this binary ships without
    // one, so dense backends fail with a configuration error while bm25
    // works out of the box.
    let encoders = NoDenseEncoders;

    match cli.command {
        Command::Build(args) => {
            let records = record::load_corpus_dir(&args.corpus_dir)?;
            tracing::info!(
                records = records.len(),
                corpus_dir = %args.corpus_dir.display(),
                "loaded corpus"
            );

            let encoder = if args.backend.is_dense() {
                Some(encoders.encoder(args.backend)?)
            } else {
                None
            };

            let mut retriever =
                Retriever::new(args.backend, args.name, args.out_dir);
            let path = retriever.build_and_save(
                &records,
                args.granularity,
                args.min_words,
                encoder,
                None,
            )?;
            println!("Wrote {}", path.display());
        }
        Command::Query(args) => {
            let mut retriever =
                Retriever::load_from_path(&args.index_path, &encoders)?;
            match &args.query {
                Some(query) => {
                    run_query(&mut retriever, query, &args)?;
                }
                None => interactive_loop(&mut retriever, &args)?,
            }
        }
        Command::Serve(args) => {
            let retriever =
                Retriever::load_from_path(&args.index_path, &encoders)?;
            let save_dir = retriever.save_dir().to_path_buf();
            let state = AppState::new(retriever.into_index()?, save_dir);

            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(serve(state, &args.addr))?;
        }
        Command::Completions(args) => {
            args.generate();
        }
    }

    Ok(())
}

fn run_query(
    retriever: &mut Retriever,
    query: &str,
    args: &QueryArgs,
) -> Result<()> {
    let hits = retriever.query_with_keys(query, args.top_k)?;

    if args.json {
        let results: Vec<serde_json::Value> = hits
            .iter()
            .map(|(key, value)| {
                serde_json::json!({
                    "key": key,
                    "corpus_id": value.corpus_id,
                    "ordinal": value.ordinal,
                })
            })
            .collect();
        println!("{}", serde_json::json!({ "results": results }));
    } else if hits.is_empty() {
        println!("No results.");
    } else {
        for (rank, (key, value)) in hits.iter().enumerate() {
            println!(
                "{:>2}. {} (chunk {})\n    {key}",
                rank + 1,
                value.corpus_id,
                value.ordinal
            );
        }
    }
    Ok(())
}

fn interactive_loop(retriever: &mut Retriever, args: &QueryArgs) -> Result<()> {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();

    loop {
        print!("query> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if query == "exit" {
            break;
        }
        run_query(retriever, query, args)?;
    }
    Ok(())
}
