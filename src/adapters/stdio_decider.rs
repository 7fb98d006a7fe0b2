//! Decider adapter binding the approval and question gates to a byte
//! stream, by default stdin/stdout.
//!
//! Two concurrent loops drain the gates; a reader mutex serializes the
//! input stream between them. The adapter terminates when its token is
//! cancelled.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Answer, ApprovalDecision, Question};
use crate::services::approval_gate::PendingApproval;
use crate::services::question_gate::QuestionGate;

const APPROVAL_PROMPT: &str = "[a]approve / [f]eedback / [s]helve";
const WAVE_PROMPT: &str = "[c]ontinue / [f]eedback / [h]alt";

pub struct StdioDecider<R, W> {
    reader: Arc<Mutex<BufReader<R>>>,
    writer: Arc<Mutex<W>>,
    approvals: mpsc::Receiver<PendingApproval>,
    questions: mpsc::Receiver<Question>,
    gate: Arc<QuestionGate>,
}

impl<R, W> StdioDecider<R, W>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(
        reader: R,
        writer: W,
        approvals: mpsc::Receiver<PendingApproval>,
        questions: mpsc::Receiver<Question>,
        gate: Arc<QuestionGate>,
    ) -> Self {
        Self {
            reader: Arc::new(Mutex::new(BufReader::new(reader))),
            writer: Arc::new(Mutex::new(writer)),
            approvals,
            questions,
            gate,
        }
    }

    /// Drive both loops until cancellation or until both gates close.
    pub async fn run(self, cancel: &CancellationToken) -> DomainResult<()> {
        let Self {
            reader,
            writer,
            mut approvals,
            mut questions,
            gate,
        } = self;

        let approval_cancel = cancel.clone();
        let approval_reader = reader.clone();
        let approval_writer = writer.clone();
        let approval_loop = tokio::spawn(async move {
            loop {
                let pending = tokio::select! {
                    received = approvals.recv() => match received {
                        Some(pending) => pending,
                        None => return Ok::<(), DomainError>(()),
                    },
                    () = approval_cancel.cancelled() => return Ok(()),
                };
                handle_approval(&approval_reader, &approval_writer, pending).await?;
            }
        });

        let question_cancel = cancel.clone();
        let question_loop = tokio::spawn(async move {
            loop {
                let question = tokio::select! {
                    received = questions.recv() => match received {
                        Some(question) => question,
                        None => return Ok::<(), DomainError>(()),
                    },
                    () = question_cancel.cancelled() => return Ok(()),
                };
                let answer = prompt_question(&reader, &writer, &question).await?;
                gate.submit_answer(answer).await?;
            }
        });

        let (a, q) = tokio::join!(approval_loop, question_loop);
        a.map_err(|e| DomainError::Harness(format!("approval loop panicked: {e}")))??;
        q.map_err(|e| DomainError::Harness(format!("question loop panicked: {e}")))??;
        Ok(())
    }
}

async fn read_line<R>(reader: &Arc<Mutex<BufReader<R>>>) -> DomainResult<String>
where
    R: tokio::io::AsyncRead + Unpin + Send,
{
    let mut guard = reader.lock().await;
    let mut line = String::new();
    let n = guard
        .read_line(&mut line)
        .await
        .map_err(|e| DomainError::Store(format!("decider input: {e}")))?;
    if n == 0 {
        return Err(DomainError::Canceled);
    }
    Ok(line.trim_end_matches(['\n', '\r']).to_string())
}

async fn write_all<W>(writer: &Arc<Mutex<W>>, text: &str) -> DomainResult<()>
where
    W: AsyncWrite + Unpin + Send,
{
    let mut guard = writer.lock().await;
    guard
        .write_all(text.as_bytes())
        .await
        .map_err(|e| DomainError::Store(format!("decider output: {e}")))?;
    guard
        .flush()
        .await
        .map_err(|e| DomainError::Store(format!("decider output: {e}")))?;
    Ok(())
}

async fn handle_approval<R, W>(
    reader: &Arc<Mutex<BufReader<R>>>,
    writer: &Arc<Mutex<W>>,
    pending: PendingApproval,
) -> DomainResult<()>
where
    R: tokio::io::AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let wave_review = pending.request.wave_review;
    let header = format!(
        "\ncommission {} — {} missions, iteration {}/{}\n",
        pending.request.commission_id,
        pending.request.manifest.len(),
        pending.request.iteration,
        pending.request.max_iterations,
    );
    write_all(writer, &header).await?;

    loop {
        let prompt = if wave_review { WAVE_PROMPT } else { APPROVAL_PROMPT };
        write_all(writer, &format!("{prompt}: ")).await?;
        let choice = read_line(reader).await?;
        let decision = match (wave_review, choice.trim()) {
            (false, "a") | (true, "c") => ApprovalDecision::Approved,
            (_, "f") => {
                write_all(writer, "feedback: ").await?;
                ApprovalDecision::Feedback(read_line(reader).await?)
            }
            (false, "s") => {
                write_all(writer, "reason: ").await?;
                ApprovalDecision::Shelved(read_line(reader).await?)
            }
            (_, "h") => {
                write_all(writer, "reason: ").await?;
                ApprovalDecision::Halted(read_line(reader).await?)
            }
            (_, other) => {
                write_all(writer, &format!("error: unrecognized choice {other:?}\n")).await?;
                continue;
            }
        };
        if let Err(e) = decision.validate() {
            write_all(writer, &format!("error: {e}\n")).await?;
            continue;
        }
        return pending.respond(decision);
    }
}

async fn prompt_question<R, W>(
    reader: &Arc<Mutex<BufReader<R>>>,
    writer: &Arc<Mutex<W>>,
    question: &Question,
) -> DomainResult<Answer>
where
    R: tokio::io::AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let mut text = format!("\n[{}] {}\n", question.asked_by, question.text);
    for (index, option) in question.options.iter().enumerate() {
        text.push_str(&format!("  {}. {}\n", index + 1, option));
    }
    text.push_str("answer (blank to skip): ");
    write_all(writer, &text).await?;

    let line = read_line(reader).await?;
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(Answer::skip(&question.id));
    }
    if let Ok(index) = trimmed.parse::<usize>() {
        if index >= 1 && index <= question.options.len() {
            return Ok(Answer::selected(&question.id, &question.options[index - 1]));
        }
    }
    Ok(Answer::free_text(&question.id, trimmed))
}
