//! Filtering adapters over event streams.

use crate::completion::CompletionSummary;
use crate::events::{EventChannel, StreamEvent};
use futures::Stream;
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Extension trait for creating filtered event streams.
pub trait EventStreamExt: Stream<Item = StreamEvent> + Sized {
    /// Only answer text, ending at the completion event.
    fn content_text(self) -> ContentStream<Self> {
        ContentStream {
            inner: self,
            accumulated: String::new(),
        }
    }

    /// Only completion summaries.
    fn completions(self) -> CompletionStream<Self> {
        CompletionStream { inner: self }
    }

    /// Only events published on `channel`.
    fn on_channel(self, channel: EventChannel) -> ChannelStream<Self> {
        ChannelStream {
            inner: self,
            channel,
        }
    }
}

impl<S> EventStreamExt for S where S: Stream<Item = StreamEvent> {}

pin_project! {
    /// Stream of content deltas.
    pub struct ContentStream<S> {
        #[pin]
        inner: S,
        accumulated: String,
    }
}

impl<S> ContentStream<S> {
    /// Text seen so far.
    pub fn accumulated_text(&self) -> &str {
        &self.accumulated
    }

    /// Consume and return the text seen so far.
    pub fn into_accumulated(self) -> String {
        self.accumulated
    }
}

impl<S> Stream for ContentStream<S>
where
    S: Stream<Item = StreamEvent>,
{
    type Item = String;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(StreamEvent::Content { delta })) => {
                    this.accumulated.push_str(&delta);
                    return Poll::Ready(Some(delta));
                }
                Poll::Ready(Some(StreamEvent::Complete(_))) | Poll::Ready(None) => {
                    return Poll::Ready(None)
                }
                Poll::Ready(Some(_)) => continue,
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

pin_project! {
    /// Stream of completion summaries.
    pub struct CompletionStream<S> {
        #[pin]
        inner: S,
    }
}

impl<S> Stream for CompletionStream<S>
where
    S: Stream<Item = StreamEvent>,
{
    type Item = CompletionSummary;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(StreamEvent::Complete(summary))) => {
                    return Poll::Ready(Some(summary))
                }
                Poll::Ready(Some(_)) => continue,
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

pin_project! {
    /// Stream of events on a single channel.
    pub struct ChannelStream<S> {
        #[pin]
        inner: S,
        channel: EventChannel,
    }
}

impl<S> Stream for ChannelStream<S>
where
    S: Stream<Item = StreamEvent>,
{
    type Item = StreamEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(event)) if event.channel() == *this.channel => {
                    return Poll::Ready(Some(event))
                }
                Poll::Ready(Some(_)) => continue,
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamConfig;
    use crate::processor::StreamProcessor;
    use chunkline_core::{FinishFragment, Fragment, FragmentKind};
    use futures::{stream, StreamExt};

    async fn events() -> Vec<StreamEvent> {
        let processor = StreamProcessor::new(StreamConfig::default());
        let source = stream::iter(
            vec![
                Fragment::reasoning_delta("r", "hmm\n"),
                Fragment::text_delta("t", "Hello\n"),
                Fragment::text_delta("t", "there"),
                Fragment::Finish(FinishFragment::new("stop")),
                Fragment::text_delta("t", "after"),
            ]
            .into_iter()
            .map(Ok),
        );
        processor.collect(source).await.unwrap().0
    }

    #[tokio::test(start_paused = true)]
    async fn test_content_text_stops_at_completion() {
        let mut content = Box::pin(stream::iter(events().await).content_text());
        let mut deltas = Vec::new();
        while let Some(delta) = content.next().await {
            deltas.push(delta);
        }
        assert_eq!(deltas, vec!["Hello\n".to_string(), "there".to_string()]);
        assert_eq!(content.accumulated_text(), "Hello\nthere");
    }

    #[tokio::test(start_paused = true)]
    async fn test_completions() {
        let summaries: Vec<CompletionSummary> =
            stream::iter(events().await).completions().collect().await;
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].message, "Hello\nthere");
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_channel() {
        let changes: Vec<StreamEvent> = stream::iter(events().await)
            .on_channel(EventChannel::KindChanged)
            .collect()
            .await;
        assert_eq!(
            changes,
            vec![
                StreamEvent::kind_changed(None, FragmentKind::ReasoningDelta),
                StreamEvent::kind_changed(
                    Some(FragmentKind::ReasoningDelta),
                    FragmentKind::TextDelta
                ),
            ]
        );
    }
}
