//! Per-request GenAI metrics, exported through prometheus-client.

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;

use crate::llm::LLMTokenUsage;
use crate::strng::RichStrng;
use crate::*;

#[derive(Clone, Hash, Default, Debug, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
	pub backend: RichStrng,
	pub model: RichStrng,
}

#[derive(Clone, Hash, Default, Debug, PartialEq, Eq, EncodeLabelSet)]
pub struct CompletionLabels {
	pub backend: RichStrng,
	pub model: RichStrng,
	pub success: bool,
}

#[derive(Clone, Hash, Default, Debug, PartialEq, Eq, EncodeLabelSet)]
pub struct TokenLabels {
	pub backend: RichStrng,
	pub model: RichStrng,
	pub kind: RichStrng,
}

#[derive(Debug)]
pub struct Metrics {
	requests: Family<RequestLabels, Counter>,
	requests_completed: Family<CompletionLabels, Counter>,
	tokens: Family<TokenLabels, Counter>,
	request_duration: Family<RequestLabels, Histogram>,
}

impl Metrics {
	pub fn new(registry: &mut Registry) -> Self {
		let requests = Family::default();
		registry.register(
			"gen_ai_requests",
			"The total number of LLM requests processed",
			requests.clone(),
		);
		let requests_completed = Family::default();
		registry.register(
			"gen_ai_requests_completed",
			"The total number of LLM requests completed, by outcome",
			requests_completed.clone(),
		);
		let tokens = Family::default();
		registry.register(
			"gen_ai_tokens",
			"The total number of tokens processed, by kind",
			tokens.clone(),
		);
		let request_duration =
			Family::<RequestLabels, Histogram>::new_with_constructor(|| {
				Histogram::new([0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0].into_iter())
			});
		registry.register(
			"gen_ai_request_duration_seconds",
			"Wall time from request start to completion",
			request_duration.clone(),
		);
		Metrics {
			requests,
			requests_completed,
			tokens,
			request_duration,
		}
	}
}

/// Per-request recording handle; the processor drives it through the
/// request lifecycle.
pub struct RequestMetrics {
	metrics: Arc<Metrics>,
	start: Instant,
	original_model: Strng,
	request_model: Strng,
	response_model: Strng,
	backend: Strng,
	completed: bool,
}

impl RequestMetrics {
	pub fn start_request(metrics: Arc<Metrics>) -> Self {
		Self {
			metrics,
			start: Instant::now(),
			original_model: Strng::default(),
			request_model: Strng::default(),
			response_model: Strng::default(),
			backend: Strng::default(),
			completed: false,
		}
	}

	pub fn set_original_model(&mut self, model: Strng) {
		self.original_model = model;
	}

	pub fn set_request_model(&mut self, model: Strng) {
		self.request_model = model;
	}

	pub fn set_response_model(&mut self, model: Strng) {
		self.response_model = model;
	}

	pub fn set_backend(&mut self, backend: Strng) {
		self.backend = backend.clone();
		self
			.metrics
			.requests
			.get_or_create(&RequestLabels {
				backend: backend.into(),
				model: self.request_model.clone().into(),
			})
			.inc();
	}

	fn model_label(&self) -> Strng {
		if self.response_model.is_empty() {
			self.request_model.clone()
		} else {
			self.response_model.clone()
		}
	}

	pub fn record_token_usage(&self, usage: &LLMTokenUsage) {
		let mut record = |kind: &'static str, value: u32| {
			self
				.metrics
				.tokens
				.get_or_create(&TokenLabels {
					backend: self.backend.clone().into(),
					model: self.model_label().into(),
					kind: strng::new(kind).into(),
				})
				.inc_by(value as u64);
		};
		record("input", usage.input_tokens);
		record("output", usage.output_tokens);
		record("total", usage.total_tokens);
	}

	pub fn record_request_completion(&mut self, success: bool) {
		// Retries re-enter the upstream phase; count each request once.
		if self.completed {
			return;
		}
		self.completed = true;
		self
			.metrics
			.requests_completed
			.get_or_create(&CompletionLabels {
				backend: self.backend.clone().into(),
				model: self.model_label().into(),
				success,
			})
			.inc();
		self
			.metrics
			.request_duration
			.get_or_create(&RequestLabels {
				backend: self.backend.clone().into(),
				model: self.model_label().into(),
			})
			.observe(self.start.elapsed().as_secs_f64());
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn completion_recorded_once_across_retries() {
		let mut registry = Registry::default();
		let metrics = Arc::new(Metrics::new(&mut registry));
		let mut req = RequestMetrics::start_request(metrics.clone());
		req.set_request_model(strng::new("gpt-4.1-nano"));
		req.set_backend(strng::new("openai"));
		req.record_request_completion(true);
		req.record_request_completion(false);

		let mut out = String::new();
		prometheus_client::encoding::text::encode(&mut out, &registry).unwrap();
		assert!(out.contains(r#"gen_ai_requests_completed_total{backend="openai",model="gpt-4.1-nano",success="true"} 1"#), "{out}");
		assert!(!out.contains(r#"success="false"} 1"#), "{out}");
	}

	#[test]
	fn token_usage_is_labeled_by_kind() {
		let mut registry = Registry::default();
		let metrics = Arc::new(Metrics::new(&mut registry));
		let mut req = RequestMetrics::start_request(metrics);
		req.set_request_model(strng::new("m"));
		req.set_backend(strng::new("b"));
		req.record_token_usage(&LLMTokenUsage {
			input_tokens: 22,
			output_tokens: 2,
			total_tokens: 24,
			cached_tokens: None,
		});
		let mut out = String::new();
		prometheus_client::encoding::text::encode(&mut out, &registry).unwrap();
		assert!(out.contains(r#"kind="input"} 22"#), "{out}");
		assert!(out.contains(r#"kind="total"} 24"#), "{out}");
	}
}
