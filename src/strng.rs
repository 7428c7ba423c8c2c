//! Cheaply cloneable, immutable strings for names that are copied around a
//! lot (backends, models, header values).

pub use arcstr::{ArcStr as Strng, format, literal};

pub fn new<A: AsRef<str>>(s: A) -> Strng {
	Strng::from(s.as_ref())
}

/// RichStrng wraps Strng to let us implement foreign traits on it, such as
/// metrics label encoding.
#[derive(Clone, Hash, Default, Debug, PartialEq, Eq)]
pub struct RichStrng(Strng);

impl std::ops::Deref for RichStrng {
	type Target = Strng;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

impl<T: Into<Strng>> From<T> for RichStrng {
	fn from(value: T) -> Self {
		RichStrng(value.into())
	}
}

impl prometheus_client::encoding::EncodeLabelValue for RichStrng {
	fn encode(
		&self,
		encoder: &mut prometheus_client::encoding::LabelValueEncoder,
	) -> Result<(), std::fmt::Error> {
		use std::fmt::Write;
		encoder.write_str(self.0.as_str())
	}
}

impl std::fmt::Display for RichStrng {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		self.0.fmt(f)
	}
}
