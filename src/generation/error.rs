//! Tipos de erro para chamadas ao backend de geração de texto.
//!
//! Define [`GenerationError`] com variantes para rate limiting, erros da API,
//! erros de rede e saída não interpretável. Usa `thiserror` para derivar
//! `Display` e `Error` a partir dos atributos `#[error(...)]`.

use thiserror::Error;

/// Erros que podem ocorrer ao pedir saída estruturada ao backend.
///
/// Todas as variantes são falhas de transporte do ponto de vista do
/// orquestrador: abortam o item atual. Uma recusa explícita do modelo
/// (`success = false`) não passa por aqui.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// O servidor retornou HTTP 429 (rate limit).
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Erro retornado pela API (ex.: 401 chave inválida, 500 erro interno).
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Falha de rede subjacente (DNS, conexão recusada, timeout).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A resposta não continha JSON válido no formato pedido.
    #[error("unparsable output: {0}")]
    Unparsable(String),
}
