use anyhow::{Context, bail};
use clap::Parser;
use reqwest::Client;
use serde_json::{Value, json};
use std::io::{self, BufRead, Write};

/// Chat with a running lead-qualification-service over HTTP.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Base URL of the service
    #[arg(long, default_value = "http://localhost:3000")]
    url: String,
}

async fn post(client: &Client, url: &str, body: Value) -> anyhow::Result<Value> {
    let response: Value = client
        .post(url)
        .json(&body)
        .send()
        .await
        .with_context(|| format!("request to {url} failed"))?
        .json()
        .await?;

    if let Some(error) = response.get("error") {
        bail!("{}: {}", error["code"], error["message"]);
    }
    Ok(response["data"].clone())
}

fn read_answer() -> anyhow::Result<Option<String>> {
    print!("> ");
    io::stdout().flush()?;
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let base = args.url.trim_end_matches('/');
    let client = Client::new();

    let session = post(&client, &format!("{base}/sessions"), json!({})).await?;
    let session_id = session["sessionId"]
        .as_str()
        .context("service returned no sessionId")?
        .to_string();
    println!("Session {session_id}");

    let chat_url = format!("{base}/chatbot-conversation");
    let mut message = String::new();

    loop {
        let turn = match post(
            &client,
            &chat_url,
            json!({ "sessionId": session_id, "userMessage": message }),
        )
        .await
        {
            Ok(turn) => turn,
            Err(e) => {
                println!("Error: {e}");
                match read_answer()? {
                    Some(answer) => {
                        message = answer;
                        continue;
                    }
                    None => return Ok(()),
                }
            }
        };

        println!("\nBot: {}", turn["response"].as_str().unwrap_or_default());
        if let Some(options) = turn["options"].as_array() {
            for option in options {
                println!("  - {}", option.as_str().unwrap_or_default());
            }
        }
        if turn["nextStep"] == "lead_qualification" {
            break;
        }

        match read_answer()? {
            Some(answer) => message = answer,
            None => return Ok(()),
        }
    }

    let result = post(
        &client,
        &format!("{base}/lead-qualification"),
        json!({ "sessionId": session_id }),
    )
    .await?;
    println!("\n{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}
