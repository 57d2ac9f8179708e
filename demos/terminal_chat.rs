use clap::Parser;
use lead_flow::{
    ConversationEngine, FlowError, InMemoryBlobStorage, InMemoryStorage, LeadFlowRunner,
    SampleContractorMatcher, Step, StepTable,
};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

/// Run the roofing inspection chat in the terminal, with everything in memory.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// YAML file replacing the built-in script
    #[arg(long)]
    step_table: Option<PathBuf>,

    /// Print debug logs from the flow
    #[arg(short, long)]
    verbose: bool,
}

fn prompt(options: &[String]) -> anyhow::Result<Option<String>> {
    for (i, option) in options.iter().enumerate() {
        println!("  [{}] {}", i + 1, option);
    }
    print!("> ");
    io::stdout().flush()?;

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let line = line.trim().to_string();

    // a bare number picks one of the suggested replies
    let picked = line
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| options.get(i).cloned());
    Ok(Some(picked.unwrap_or(line)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("lead_flow=debug")
            .init();
    }

    let table = match &args.step_table {
        Some(path) => Arc::new(StepTable::from_yaml_str(&std::fs::read_to_string(path)?)?),
        None => StepTable::standard(),
    };

    let storage = Arc::new(InMemoryStorage::new());
    let runner = LeadFlowRunner::new(
        ConversationEngine::new(table),
        storage.clone(),
        storage,
        Arc::new(InMemoryBlobStorage::new("lead-photos")),
        Arc::new(SampleContractorMatcher::new()),
    );

    let session = runner.start_session().await?;
    let mut outcome = runner.take_turn(&session.session_id, "").await?;

    loop {
        println!("\nBot: {}", outcome.response);
        if outcome.show_photo_upload {
            println!("(photo upload is available through the HTTP service)");
        }
        if outcome.next_step == Step::LeadQualification {
            break;
        }

        let Some(answer) = prompt(&outcome.options)? else {
            println!("Bye!");
            return Ok(());
        };

        match runner.take_turn(&session.session_id, &answer).await {
            Ok(next) => {
                println!("[progress {}%]", next.progress);
                outcome = next;
            }
            Err(FlowError::ConversationCompleted(_)) => {
                println!("This conversation has already finished.");
                break;
            }
            Err(e) => println!("Error: {e}"),
        }
    }

    let result = runner.qualify_lead(&session.session_id, None).await?;
    println!(
        "\nScore {}/10, priority {}, {}",
        result.qualification_score,
        result.priority,
        if result.qualified {
            "qualified"
        } else {
            "not qualified"
        }
    );
    for contractor in &result.contractor_matches {
        println!(
            "  - {} ({}★, {} reviews), {}",
            contractor.name, contractor.rating, contractor.reviews, contractor.phone
        );
    }
    println!("{} (expected response: {})", result.next_steps, result.estimated_response);

    Ok(())
}
