use std::{
    collections::VecDeque,
    pin::{Pin, pin},
    task::{Context, Poll},
};

use futures::{Stream, StreamExt};
use pin_project::pin_project;

use crate::{
    LlmError, Result,
    adapter::{AggregateResponse, StreamAdapter},
    sse::SseFormatter,
    unified::UnifiedStreamEvent,
};

/// SSE frames of one response, produced from a neutral event stream.
///
/// The source is polled only once every frame of the previous event was
/// taken. The stream ends with the formatter's done frame, or with a single
/// error item when the source reports an `error` event.
#[pin_project]
pub struct AdaptedStream<S> {
    #[pin]
    source: S,
    adapter: StreamAdapter,
    formatter: Box<dyn SseFormatter>,
    buffer: VecDeque<String>,
    started: bool,
    done: bool,
}

impl<S> AdaptedStream<S>
where
    S: Stream<Item = UnifiedStreamEvent>,
{
    pub fn new(adapter: StreamAdapter, formatter: Box<dyn SseFormatter>, source: S) -> Self {
        Self {
            source,
            adapter,
            formatter,
            buffer: VecDeque::new(),
            started: false,
            done: false,
        }
    }
}

impl<S> Stream for AdaptedStream<S>
where
    S: Stream<Item = UnifiedStreamEvent>,
{
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if let Some(frame) = this.buffer.pop_front() {
                return Poll::Ready(Some(Ok(frame)));
            }

            if *this.done {
                return Poll::Ready(None);
            }

            let (events, finished) = if !*this.started {
                *this.started = true;
                (this.adapter.emit_opening(), false)
            } else {
                match this.source.as_mut().poll_next(cx) {
                    Poll::Ready(Some(event)) => match this.adapter.consume(event) {
                        Ok(events) => (events, false),
                        Err(error) => {
                            *this.done = true;
                            return Poll::Ready(Some(Err(LlmError::from(error))));
                        }
                    },
                    Poll::Ready(None) => (this.adapter.finalize(), true),
                    Poll::Pending => return Poll::Pending,
                }
            };

            for event in &events {
                match this.formatter.format_event(event) {
                    Ok(frame) => this.buffer.push_back(frame),
                    Err(error) => {
                        log::error!("Failed to serialize {} event: {error}", event.event_type());

                        *this.done = true;
                        this.buffer.clear();

                        return Poll::Ready(Some(Err(error)));
                    }
                }
            }

            if finished {
                *this.done = true;
                this.buffer.push_back(this.formatter.format_done());
            }
        }
    }
}

/// Drains a neutral event stream through the adapter and returns the complete
/// response, as a non-streaming endpoint would send it.
pub async fn aggregate<S>(mut adapter: StreamAdapter, source: S) -> Result<AggregateResponse>
where
    S: Stream<Item = UnifiedStreamEvent>,
{
    let mut source = pin!(source);

    while let Some(event) = source.next().await {
        adapter.consume(event)?;
    }

    adapter.finalize();

    Ok(adapter.build_aggregate_response())
}
