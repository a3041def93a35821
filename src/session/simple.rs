//! Small one-packet operations: `set_schema` and `quit`.

use crate::error::Error;
use crate::protocol::text::{ComInitDb, ComQuit};
use crate::session::{NextAction, SessionAlgo, SessionState, SessionStatus};

enum Step {
    Initial,
    Writing,
    Reading,
}

/// `USE <schema>` via COM_INIT_DB; expects OK/ERR.
pub(crate) struct InitDbAlgo<'a> {
    schema: &'a str,
    seqnum: u8,
    step: Step,
}

impl<'a> InitDbAlgo<'a> {
    pub(crate) fn new(schema: &'a str) -> Self {
        Self {
            schema,
            seqnum: 0,
            step: Step::Initial,
        }
    }
}

impl SessionAlgo for InitDbAlgo<'_> {
    fn resume(&mut self, st: &mut SessionState, mut err: Option<Error>) -> NextAction {
        loop {
            match self.step {
                Step::Initial => {
                    if let Err(e) = st.check_status_ready() {
                        return NextAction::Done(Err(e));
                    }

                    if let Err(e) = st.write_packet(ComInitDb(self.schema), &mut self.seqnum) {
                        return NextAction::Done(Err(e));
                    }

                    self.step = Step::Writing;
                    return NextAction::Write;
                }

                Step::Writing => {
                    if let Some(e) = err.take() {
                        return NextAction::Done(Err(e));
                    }

                    if let Err(e) = st.begin_read(self.seqnum, false) {
                        return NextAction::Done(Err(e));
                    }

                    self.step = Step::Reading;
                    return NextAction::Read;
                }

                Step::Reading => {
                    if let Some(e) = err.take() {
                        return NextAction::Done(Err(e));
                    }

                    return NextAction::Done(st.process_ok_response().map(drop));
                }
            }
        }
    }
}

/// COM_QUIT. Fire-and-forget: the server answers by closing the
/// transport, so the only action after writing is to shut the socket.
pub(crate) struct QuitAlgo {
    step: Step,
}

impl QuitAlgo {
    pub(crate) fn new() -> Self {
        Self {
            step: Step::Initial,
        }
    }
}

impl SessionAlgo for QuitAlgo {
    fn resume(&mut self, st: &mut SessionState, mut err: Option<Error>) -> NextAction {
        loop {
            match self.step {
                Step::Initial => {
                    if st.status == SessionStatus::NotConnected {
                        return NextAction::Done(Ok(()));
                    }

                    let mut seqnum = 0;
                    if let Err(e) = st.write_packet(ComQuit, &mut seqnum) {
                        return NextAction::Done(Err(e));
                    }

                    self.step = Step::Writing;
                    return NextAction::Write;
                }

                Step::Writing | Step::Reading => {
                    let result = match err.take() {
                        Some(e) => Err(e),
                        None => Ok(()),
                    };

                    st.status = SessionStatus::NotConnected;
                    return NextAction::Done(result);
                }
            }
        }
    }
}
