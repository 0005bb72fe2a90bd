// 🙋 Interactive Resolution - escalating unknown symbols to a human
// Collecting → Resolved. Cancel is a normal outcome: everything pending stays Missing.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::sync::mpsc;
use tracing::{debug, info};

use crate::classifier::UnresolvedSymbol;
use crate::symbols::{normalize_symbol, AssetType};

// ============================================================================
// REQUEST / RESPONSE
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionRequest {
    pub symbols: Vec<UnresolvedSymbol>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionResponse {
    /// One choice per symbol; None = left empty
    Confirmed(BTreeMap<String, Option<AssetType>>),
    /// Dialog closed without saving
    Cancelled,
}

/// Whatever answers the request: a terminal dialog, a prompt, a channel to a UI thread.
/// The batch does not move on until `resolve` returns.
pub trait Resolver {
    fn resolve(&mut self, request: &ResolutionRequest) -> Result<ResolutionResponse>;
}

// ============================================================================
// ESCALATION STATE MACHINE
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    /// Symbols the user gave a type
    pub classified: BTreeMap<String, AssetType>,
    /// Symbols left empty (or everything, on cancel)
    pub skipped: Vec<String>,
    pub cancelled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Escalation {
    Collecting(ResolutionRequest),
    Resolved(Resolution),
}

impl Escalation {
    pub fn begin(symbols: Vec<UnresolvedSymbol>) -> Self {
        if symbols.is_empty() {
            return Escalation::Resolved(Resolution::default());
        }
        Escalation::Collecting(ResolutionRequest { symbols })
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Escalation::Resolved(_))
    }

    pub fn request(&self) -> Option<&ResolutionRequest> {
        match self {
            Escalation::Collecting(request) => Some(request),
            Escalation::Resolved(_) => None,
        }
    }

    /// Collecting → Resolved with the user's choices. Choices for symbols that
    /// were never asked about are ignored.
    pub fn confirm(self, choices: &BTreeMap<String, Option<AssetType>>) -> Self {
        let request = match self {
            Escalation::Collecting(request) => request,
            resolved => return resolved,
        };

        let choices: BTreeMap<String, Option<AssetType>> = choices
            .iter()
            .map(|(symbol, choice)| (normalize_symbol(symbol), *choice))
            .collect();

        let mut resolution = Resolution::default();
        for pending in request.symbols {
            match choices.get(&pending.symbol).copied().flatten() {
                Some(asset_type) => {
                    resolution.classified.insert(pending.symbol, asset_type);
                }
                None => resolution.skipped.push(pending.symbol),
            }
        }

        Escalation::Resolved(resolution)
    }

    /// Collecting → Resolved with nothing classified
    pub fn cancel(self) -> Self {
        match self {
            Escalation::Collecting(request) => Escalation::Resolved(Resolution {
                classified: BTreeMap::new(),
                skipped: request.symbols.into_iter().map(|s| s.symbol).collect(),
                cancelled: true,
            }),
            resolved => resolved,
        }
    }

    pub fn apply(self, response: &ResolutionResponse) -> Self {
        match response {
            ResolutionResponse::Confirmed(choices) => self.confirm(choices),
            ResolutionResponse::Cancelled => self.cancel(),
        }
    }

    /// Drive the escalation to completion with a resolver
    pub fn run(self, resolver: &mut dyn Resolver) -> Result<Resolution> {
        let escalation = match self.request() {
            Some(request) => {
                info!(count = request.symbols.len(), "Escalating unresolved symbols");
                let response = resolver.resolve(request)?;
                self.apply(&response)
            }
            None => self,
        };

        match escalation {
            Escalation::Resolved(resolution) => {
                debug!(
                    classified = resolution.classified.len(),
                    skipped = resolution.skipped.len(),
                    cancelled = resolution.cancelled,
                    "Escalation resolved"
                );
                Ok(resolution)
            }
            Escalation::Collecting(_) => Err(anyhow::anyhow!("Escalation left unresolved")),
        }
    }
}

// ============================================================================
// RESOLVERS
// ============================================================================

/// Non-interactive: behaves like closing the dialog straight away
pub struct CancelResolver;

impl Resolver for CancelResolver {
    fn resolve(&mut self, _request: &ResolutionRequest) -> Result<ResolutionResponse> {
        Ok(ResolutionResponse::Cancelled)
    }
}

/// Non-interactive with heuristics: confirm every suggestion, skip the rest
pub struct SuggestionResolver;

impl Resolver for SuggestionResolver {
    fn resolve(&mut self, request: &ResolutionRequest) -> Result<ResolutionResponse> {
        let choices = request
            .symbols
            .iter()
            .map(|s| (s.symbol.clone(), s.suggestion))
            .collect();
        Ok(ResolutionResponse::Confirmed(choices))
    }
}

/// A request in flight to another thread (e.g. a UI loop), with its reply slot
pub struct PendingResolution {
    pub request: ResolutionRequest,
    pub reply: mpsc::Sender<ResolutionResponse>,
}

/// Message-passing boundary: sends the request and blocks on the reply.
/// A UI that drops the reply sender counts as cancel.
pub struct ChannelResolver {
    requests: mpsc::Sender<PendingResolution>,
}

impl ChannelResolver {
    pub fn new(requests: mpsc::Sender<PendingResolution>) -> Self {
        ChannelResolver { requests }
    }

    pub fn channel() -> (Self, mpsc::Receiver<PendingResolution>) {
        let (tx, rx) = mpsc::channel();
        (ChannelResolver::new(tx), rx)
    }
}

impl Resolver for ChannelResolver {
    fn resolve(&mut self, request: &ResolutionRequest) -> Result<ResolutionResponse> {
        let (reply_tx, reply_rx) = mpsc::channel();

        let pending = PendingResolution {
            request: request.clone(),
            reply: reply_tx,
        };
        if self.requests.send(pending).is_err() {
            debug!("Resolution receiver gone, treating as cancel");
            return Ok(ResolutionResponse::Cancelled);
        }

        Ok(reply_rx.recv().unwrap_or(ResolutionResponse::Cancelled))
    }
}

/// Line-based prompt: one answer per symbol.
/// Empty line = accept the suggestion (or skip), `q` = cancel everything.
pub struct PromptResolver<R: BufRead, W: Write> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> PromptResolver<R, W> {
    pub fn new(input: R, output: W) -> Self {
        PromptResolver { input, output }
    }

    fn read_answer(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        let read = self
            .input
            .read_line(&mut line)
            .context("Failed to read classification answer")?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }
}

impl<R: BufRead, W: Write> Resolver for PromptResolver<R, W> {
    fn resolve(&mut self, request: &ResolutionRequest) -> Result<ResolutionResponse> {
        writeln!(
            self.output,
            "\n❓ {} unknown symbol(s). Type one of: Stock, Crypto, ETF, Bond, Missing",
            request.symbols.len()
        )?;
        writeln!(self.output, "   (Enter = suggestion/skip, q = cancel)\n")?;

        let mut choices = BTreeMap::new();

        for pending in &request.symbols {
            loop {
                let name = pending.name.as_deref().unwrap_or("");
                let hint = pending
                    .suggestion
                    .map(|s| format!(" [{}]", s))
                    .unwrap_or_default();
                write!(self.output, "   {} {}{}: ", pending.symbol, name, hint)?;
                self.output.flush()?;

                let answer = match self.read_answer()? {
                    Some(answer) => answer,
                    None => return Ok(ResolutionResponse::Cancelled),
                };

                if answer.eq_ignore_ascii_case("q") {
                    return Ok(ResolutionResponse::Cancelled);
                }

                if answer.is_empty() {
                    choices.insert(pending.symbol.clone(), pending.suggestion);
                    break;
                }

                match answer.parse::<AssetType>() {
                    Ok(asset_type) => {
                        choices.insert(pending.symbol.clone(), Some(asset_type));
                        break;
                    }
                    Err(e) => writeln!(self.output, "   ⚠️  {}", e)?,
                }
            }
        }

        Ok(ResolutionResponse::Confirmed(choices))
    }
}

// ============================================================================
// TESTS
// ============================================================================
