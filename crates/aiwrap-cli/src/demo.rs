//! The `demo` subcommand: a guided tour of the service API.
//!
//! Every step prints its result and moves on when it fails, so one bad call
//! (say, a model the account cannot use) does not hide the rest.

use std::io::Write;

use aiwrap_ai::{AiService, CancellationToken, ChatRequest, Message};
use tracing::warn;

/// Run every demo step against `provider`.
pub async fn run(service: &AiService, provider: &str) {
    simple_chat(service, provider).await;
    chat_with_history(service, provider).await;
    streaming_chat(service, provider).await;
    provider_info(service, provider).await;
    health_check(service, provider).await;
    advanced_chat(service, provider).await;
}

async fn simple_chat(service: &AiService, provider: &str) {
    println!("=== Simple Chat ===");
    match service
        .simple_chat(provider, "gpt-3.5-turbo", "What is the capital of France?")
        .await
    {
        Ok(reply) => println!("Response: {reply}\n"),
        Err(e) => warn!(error = %e, "simple chat failed"),
    }
}

async fn chat_with_history(service: &AiService, provider: &str) {
    println!("=== Chat with History ===");
    let messages = vec![
        Message::system("You are a helpful assistant that speaks like a pirate."),
        Message::user("Tell me about the weather."),
    ];
    match service
        .chat_with_history(provider, "gpt-3.5-turbo", messages)
        .await
    {
        Ok(reply) => println!("Pirate response: {reply}\n"),
        Err(e) => warn!(error = %e, "chat with history failed"),
    }
}

async fn streaming_chat(service: &AiService, provider: &str) {
    println!("=== Streaming Chat ===");
    let request = ChatRequest::new(vec![Message::user(
        "Write a short poem about artificial intelligence.",
    )])
    .with_model("gpt-3.5-turbo")
    .with_max_tokens(150)
    .with_temperature(0.7);

    let mut stream = match service
        .chat_stream(provider, &request, CancellationToken::new())
        .await
    {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "streaming chat failed");
            return;
        }
    };

    print!("Streamed response: ");
    while let Some(chunk) = stream.recv().await {
        if let Some(e) = chunk.error {
            println!();
            warn!(error = %e, "stream failed");
            return;
        }
        print!("{}", chunk.content);
        let _ = std::io::stdout().flush();
        if chunk.done {
            println!("\n[stream completed]\n");
            return;
        }
    }
    println!();
}

async fn provider_info(service: &AiService, provider: &str) {
    println!("=== Provider Information ===");
    println!("Available providers: {}", service.list().join(", "));
    match service.provider_models(provider).await {
        Ok(models) => println!("Models: {}\n", models.join(", ")),
        Err(e) => warn!(error = %e, "listing models failed"),
    }
}

async fn health_check(service: &AiService, provider: &str) {
    println!("=== Health Check ===");
    match service.health_check(provider).await {
        Ok(()) => println!("{provider} provider is healthy\n"),
        Err(e) => warn!(error = %e, "health check failed"),
    }
}

async fn advanced_chat(service: &AiService, provider: &str) {
    println!("=== Advanced Chat ===");
    let request = ChatRequest::new(vec![
        Message::system("You are a creative writing assistant."),
        Message::user("Write a creative title for a sci-fi story about time travel."),
    ])
    .with_model("gpt-4")
    .with_max_tokens(50)
    .with_temperature(0.9);

    match service.chat(provider, &request).await {
        Ok(resp) => {
            println!("Creative title: {}", resp.content);
            println!(
                "Usage: prompt={} completion={} total={}",
                resp.usage.prompt_tokens, resp.usage.completion_tokens, resp.usage.total_tokens
            );
            println!("Model: {}, ID: {}", resp.model, resp.id);
        }
        Err(e) => warn!(error = %e, "advanced chat failed"),
    }
}
