use crate::metrics::MetricSample;
use crate::runner::vu::VuState;
use crate::scenario::RequestStep;
use anyhow::{Context, Result};
use reqwest::Client;
use std::time::{Duration, Instant};
use url::Url;

/// What happened when one step ran. A failed request (connection refused,
/// timeout, bad URL after substitution) still produces an outcome with the
/// time-to-failure as its latency; nothing a step does can abort the run.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub status: Option<u16>,
    pub latency: Duration,
    pub body: Option<String>,
    pub error: Option<String>,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

impl Outcome {
    pub fn failed(&self) -> bool {
        self.error.is_some() || self.status.map_or(true, |s| s >= 400)
    }

    pub fn sample(&self) -> MetricSample {
        MetricSample {
            latency: self.latency,
            status: self.status,
            failed: self.failed(),
            bytes_sent: self.bytes_sent,
            bytes_received: self.bytes_received,
        }
    }
}

/// Issues one HTTP request per step against the shared reqwest client,
/// substituting the virtual user's captures into the templates first.
#[derive(Clone)]
pub struct StepExecutor {
    client: Client,
}

impl StepExecutor {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }

    pub async fn execute(&self, step: &RequestStep, state: &VuState) -> Outcome {
        let started = Instant::now();
        match self.send(step, state).await {
            Ok((status, body, bytes_sent)) => Outcome {
                status: Some(status),
                latency: started.elapsed(),
                bytes_sent,
                bytes_received: body.len() as u64,
                body: Some(body),
                error: None,
            },
            Err(e) => Outcome {
                status: None,
                latency: started.elapsed(),
                body: None,
                error: Some(e.to_string()),
                bytes_sent: 0,
                bytes_received: 0,
            },
        }
    }

    async fn send(&self, step: &RequestStep, state: &VuState) -> Result<(u16, String, u64)> {
        let url_str = state.substitute(&step.url);
        let url = Url::parse(&url_str).with_context(|| format!("Invalid URL: {}", url_str))?;

        let mut builder = self.client.request(step.method.clone(), url);
        for (key, value) in &step.headers {
            builder = builder.header(state.substitute(key), state.substitute(value));
        }

        let mut bytes_sent = 0u64;
        if let Some(body) = &step.body {
            let body = state.substitute(body);
            bytes_sent = body.len() as u64;
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .context("Failed to send HTTP request")?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        Ok((status, body, bytes_sent))
    }
}
