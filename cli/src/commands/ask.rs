use std::sync::Arc;

use edutrack_core::assistant::{Assistant, AssistantConfig, AssistantMode, GeminiClient};
use edutrack_core::chat::{ChatError, ChatSession};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Chat with the assistant directly, without the API. Reads one question per
/// line from stdin; `--once` asks a single question and exits.
pub async fn run(once: Option<String>) -> i32 {
    let config = AssistantConfig::from_env();
    if !config.is_configured() {
        tracing::warn!("GEMINI_API_KEY is not set");
    }
    let client = match GeminiClient::new(config) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            eprintln!("{}", serde_json::json!({"error": "cli_error", "message": e.to_string()}));
            return 4;
        }
    };
    let mut chat = ChatSession::new(client);

    let result = match once {
        Some(question) => ask_once(&mut chat, &question, &mut tokio::io::stdout()).await,
        None => {
            let stdin = BufReader::new(tokio::io::stdin());
            repl(&mut chat, stdin, &mut tokio::io::stdout()).await
        }
    };

    match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("{}", serde_json::json!({"error": "io_error", "message": e.to_string()}));
            2
        }
    }
}

async fn ask_once<A, W>(chat: &mut ChatSession<A>, question: &str, out: &mut W) -> std::io::Result<()>
where
    A: Assistant,
    W: AsyncWrite + Unpin,
{
    match chat.send(question).await {
        Ok(reply) => {
            out.write_all(format!("{}\n", reply.text).as_bytes()).await?;
        }
        Err(ChatError::EmptyMessage) => {
            out.write_all(b"(empty question)\n").await?;
        }
    }
    out.flush().await
}

async fn repl<A, R, W>(chat: &mut ChatSession<A>, input: R, out: &mut W) -> std::io::Result<()>
where
    A: Assistant,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if let Some(greeting) = chat.messages().first() {
        out.write_all(format!("assistant> {}\n", greeting.text).as_bytes())
            .await?;
    }

    let mut lines = input.lines();
    loop {
        out.write_all(b"you> ").await?;
        out.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "/quit" | "/exit") {
            break;
        }

        let was_live = chat.mode().is_live();
        if let Ok(reply) = chat.send(line).await {
            out.write_all(format!("assistant> {}\n", reply.text).as_bytes())
                .await?;
        }
        if was_live {
            if let AssistantMode::Degraded { reason, .. } = chat.mode() {
                tracing::warn!(?reason, "assistant unavailable, using offline replies for this session");
            }
        }
    }

    out.flush().await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use edutrack_core::assistant::{AssistantError, FALLBACK_REPLIES};
    use edutrack_core::chat::GREETING;

    use super::*;

    struct Counting {
        calls: AtomicUsize,
        reply: Result<&'static str, ()>,
    }

    impl Assistant for Counting {
        async fn ask(&self, prompt: &str) -> Result<String, AssistantError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.reply {
                Ok(text) => Ok(format!("{text} ({prompt})")),
                Err(()) => Err(AssistantError::Decode(
                    serde_json::from_str::<serde_json::Value>("not json").unwrap_err(),
                )),
            }
        }
    }

    fn assistant(reply: Result<&'static str, ()>) -> Arc<Counting> {
        Arc::new(Counting {
            calls: AtomicUsize::new(0),
            reply,
        })
    }

    #[tokio::test]
    async fn repl_greets_answers_and_stops_at_quit() {
        let assistant = assistant(Ok("Roots come from the discriminant"));
        let mut chat = ChatSession::new(Arc::clone(&assistant));
        let input: &[u8] = b"What is a quadratic equation?\n\n/quit\nnever asked\n";
        let mut out = Vec::new();

        repl(&mut chat, input, &mut out).await.unwrap();

        let out = String::from_utf8(out).unwrap();
        assert!(out.starts_with(&format!("assistant> {GREETING}\n")));
        assert!(out.contains(
            "assistant> Roots come from the discriminant (What is a quadratic equation?)"
        ));
        assert_eq!(assistant.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn repl_keeps_answering_from_fallback_after_failure() {
        let assistant = assistant(Err(()));
        let mut chat = ChatSession::new(Arc::clone(&assistant));
        let input: &[u8] = b"first\nsecond\n";
        let mut out = Vec::new();

        repl(&mut chat, input, &mut out).await.unwrap();

        let out = String::from_utf8(out).unwrap();
        let replies: Vec<&str> = out
            .split("assistant> ")
            .skip(2)
            .map(|chunk| chunk.lines().next().unwrap_or_default())
            .collect();
        assert_eq!(replies.len(), 2);
        for reply in replies {
            assert!(FALLBACK_REPLIES.contains(&reply), "unexpected reply: {reply}");
        }
        assert_eq!(assistant.calls.load(Ordering::SeqCst), 1, "latched after first failure");
        assert!(!chat.mode().is_live());
    }

    #[tokio::test]
    async fn ask_once_reports_empty_question() {
        let assistant = assistant(Ok("unused"));
        let mut chat = ChatSession::new(Arc::clone(&assistant));
        let mut out = Vec::new();

        ask_once(&mut chat, "   ", &mut out).await.unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "(empty question)\n");
        assert_eq!(assistant.calls.load(Ordering::SeqCst), 0);
    }
}
