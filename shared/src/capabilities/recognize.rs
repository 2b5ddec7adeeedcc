use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};

use crate::image_processing::PreparedImage;
use crate::recognition::Recognition;

/// Asks the shell to identify the player model in a prepared photo. The
/// shell answers through a [`Recognizer`](crate::recognition::Recognizer).
pub struct Recognize<Ev> {
    context: CapabilityContext<RecognizeOperation, Ev>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognizeOperation {
    pub image: PreparedImage,
}

impl Operation for RecognizeOperation {
    type Output = Recognition;
}

impl<Ev> Capability<Ev> for Recognize<Ev> {
    type Operation = RecognizeOperation;
    type MappedSelf<MappedEv> = Recognize<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        Recognize::new(self.context.map_event(f))
    }
}

impl<Ev> Recognize<Ev>
where
    Ev: 'static,
{
    pub fn new(context: CapabilityContext<RecognizeOperation, Ev>) -> Self {
        Self { context }
    }

    pub fn identify<F>(&self, image: PreparedImage, make_event: F)
    where
        F: FnOnce(Recognition) -> Ev + Send + 'static,
    {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            let recognition = ctx.request_from_shell(RecognizeOperation { image }).await;
            ctx.update_app(make_event(recognition));
        });
    }
}
