//! The lead assessment pipeline.
//!
//! Stage 1 collects independent signals about the lead's website, stage 2
//! analyzes the captured screenshots, and the finishing components score
//! the lead and draft outreach content from whatever succeeded.

use std::time::Duration;

use super::{ComponentDescriptor, PipelineBuilder, PipelineSpec};
use crate::errors::PipelineValidationError;

/// Core Web Vitals and performance audit.
pub const PAGESPEED: &str = "pagespeed";
/// TLS, header and exposure checks.
pub const SECURITY_SCAN: &str = "security_scan";
/// Organic search visibility.
pub const SEMRUSH_SEO: &str = "semrush_seo";
/// Desktop and mobile screenshots.
pub const SCREENSHOT_CAPTURE: &str = "screenshot_capture";
/// Vision-model UX review of the screenshots.
pub const VISUAL_ANALYSIS: &str = "visual_analysis";
/// Composite lead score.
pub const BUSINESS_SCORING: &str = "business_scoring";
/// Outreach copy generation.
pub const CONTENT_GENERATION: &str = "content_generation";

/// Builds the default lead assessment pipeline.
///
/// # Errors
///
/// Never fails for the built-in definition; the result is validated like
/// any other pipeline.
pub fn lead_assessment_pipeline() -> Result<PipelineSpec, PipelineValidationError> {
    PipelineBuilder::new("lead_assessment")
        .stage("collect")
        .component(ComponentDescriptor::new(PAGESPEED).with_timeout(Duration::from_secs(30)))
        .component(ComponentDescriptor::new(SECURITY_SCAN).with_timeout(Duration::from_secs(20)))
        .component(ComponentDescriptor::new(SEMRUSH_SEO).with_timeout(Duration::from_secs(30)))
        .component(
            ComponentDescriptor::new(SCREENSHOT_CAPTURE)
                .with_timeout(Duration::from_secs(60))
                .with_max_retries(1),
        )
        .stage("analyze")
        .component(
            ComponentDescriptor::new(VISUAL_ANALYSIS)
                .with_timeout(Duration::from_secs(90))
                .with_max_retries(1)
                .depends_on([SCREENSHOT_CAPTURE]),
        )
        .finishing(
            ComponentDescriptor::new(BUSINESS_SCORING)
                .with_timeout(Duration::from_secs(10))
                .with_max_retries(0),
        )
        .finishing(
            ComponentDescriptor::new(CONTENT_GENERATION)
                .with_timeout(Duration::from_secs(120))
                .with_max_retries(1),
        )
        .build()
}
