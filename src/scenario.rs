use typed_builder::TypedBuilder;

use crate::template::RequestTemplate;

/// What a run hits: a request template and the transport that sends it.
///
/// How many requests, how concurrently and how fast is up to the
/// [`crate::Executor`] the scenario is handed to. `T` is usually a
/// [`reqwest::Client`]; anything implementing [`crate::transport::Transport`]
/// works.
#[derive(Debug, Clone, TypedBuilder)]
pub struct Scenario<T> {
    #[builder(setter(into))]
    pub name: String,
    pub template: RequestTemplate,
    pub transport: T,
}
