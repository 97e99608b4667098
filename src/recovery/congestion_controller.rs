// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The sender state machine (C4): owns `cwnd`, `ssthresh`, bytes in flight,
//! and the round-end marker, and orchestrates the Cubic window function
//! (C1), the HyStart detector (C2), and the RTT estimator (C3) in response
//! to send/ack/loss/feedback/timeout events. See the module-level docs for
//! the ordering guarantees the owning transport must honor.

use crate::config::{Config, GrowthLaw};
use crate::counter::{Counter, Saturating};
use crate::event::{NoopPublisher, PreconditionViolation, Publisher, SlowStartExitCause};
use crate::recovery::{
    Cubic, HybridSlowStart, RttEstimator, DEFAULT_INITIAL_CONGESTION_WINDOW,
    DEFAULT_RECEIVE_WINDOW, HYSTART_LOW_WINDOW, MAX_BURST_SEGMENTS, MINIMUM_CONGESTION_WINDOW,
};
use crate::time::{Duration, Timestamp};

/// Whether a packet is an original transmission or a retransmission, and if
/// a retransmission, of what kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransmissionType {
    /// An original, not-previously-sent packet.
    First,
    /// A retransmission triggered by an explicit NACK from the peer.
    NackRetransmit,
    /// Any other retransmission (e.g. probe timeout retransmission).
    OtherRetransmit,
}

/// Whether a packet carries data the transport will retransmit if lost.
/// ACK-only packets do not.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HasRetransmittableData {
    Yes,
    No,
}

/// Sender-side congestion control for a single connection.
///
/// `P` is the diagnostics [`Publisher`] this controller reports notable
/// transitions to; it defaults to [`NoopPublisher`] so a caller that doesn't
/// care can just write `CongestionController::new(config)`.
///
/// One instance lives per connection: created once the growth law and
/// datagram size are known, driven for the life of the connection, dropped
/// on connection close (at which point, if a non-noop publisher is
/// attached, the final congestion window is reported once more).
#[derive(Debug)]
pub struct CongestionController<P: Publisher = NoopPublisher> {
    cwnd: u32,
    ssthresh: u32,
    max_cwnd: u32,
    bytes_in_flight: Counter<u32, Saturating>,
    receive_window: u32,
    reno: bool,
    cwnd_count: Counter<u32, Saturating>,
    end_seq: u64,
    update_end_seq: bool,
    last_lost_total: u64,
    max_datagram_size: u16,
    rtt_estimator: RttEstimator,
    cubic: Cubic,
    hystart: HybridSlowStart,
    /// Whether the window was cwnd-limited as of the most recent send,
    /// sampled once per `on_packet_sent` and consulted (not recomputed) by
    /// every `on_ack` until the next send. Recomputing live at ack time
    /// would use `bytes_in_flight` as it drains through a round of acks,
    /// which under-counts: a burst sent while genuinely cwnd-limited still
    /// deserves growth on each of its acks even after later acks have
    /// shrunk `bytes_in_flight` well below the edge.
    cwnd_limited: bool,
    publisher: P,
}

impl CongestionController<NoopPublisher> {
    /// Creates a controller from `config`, discarding diagnostics. Use
    /// [`Self::with_publisher`] to attach one.
    #[inline]
    pub fn new(config: Config) -> Self {
        Self::with_publisher(config, NoopPublisher)
    }
}

impl<P: Publisher> CongestionController<P> {
    /// Creates a controller from `config`, reporting notable transitions to
    /// `publisher`.
    #[inline]
    pub fn with_publisher(config: Config, publisher: P) -> Self {
        let max_cwnd = config.max_congestion_window();
        let cwnd = DEFAULT_INITIAL_CONGESTION_WINDOW.min(max_cwnd);

        // Arms the first round immediately: without this, `started` stays
        // false forever, since the only other call site for `reset` is
        // gated on `end_of_round`, which itself requires `started`.
        let mut hystart = HybridSlowStart::new();
        hystart.reset(0);

        Self {
            cwnd,
            ssthresh: max_cwnd,
            max_cwnd,
            bytes_in_flight: Counter::new(0),
            receive_window: DEFAULT_RECEIVE_WINDOW,
            reno: matches!(config.growth_law(), GrowthLaw::Reno),
            cwnd_count: Counter::new(0),
            end_seq: 0,
            update_end_seq: true,
            last_lost_total: 0,
            max_datagram_size: config.max_datagram_size(),
            rtt_estimator: RttEstimator::new(),
            cubic: Cubic::new(),
            hystart,
            cwnd_limited: false,
            publisher,
        }
    }

    /// Applies a boot-time [`Config`] override. Only the server-side initial
    /// congestion window override is recognised, and only takes effect when
    /// `is_server` is true; the client keeps the default. There is no
    /// runtime reconfiguration beyond this one call, normally made once at
    /// or shortly after construction.
    #[inline]
    pub fn set_from_config(&mut self, config: &Config, is_server: bool) {
        if !is_server {
            return;
        }

        if let Some(segments) = config.server_initial_congestion_window() {
            self.cwnd = segments.min(self.max_cwnd);
        }
    }

    /// The current congestion window, in bytes.
    #[inline]
    pub fn congestion_window(&self) -> u32 {
        self.cwnd * self.max_datagram_size as u32
    }

    /// Overrides the congestion window directly, taking `bytes` and
    /// converting to segments via the configured max datagram size. Clamped
    /// to `[1, max_cwnd]` segments.
    #[inline]
    pub fn set_congestion_window(&mut self, bytes: u32) {
        let segments = bytes / self.max_datagram_size as u32;
        self.cwnd = segments.max(MINIMUM_CONGESTION_WINDOW).min(self.max_cwnd);
    }

    /// The sum of sent-but-not-yet-acked-or-abandoned retransmittable bytes.
    #[inline]
    pub fn bytes_in_flight(&self) -> u32 {
        *self.bytes_in_flight
    }

    /// The smoothed round-trip time. Returns the initial RTT guess if no
    /// sample has arrived yet.
    #[inline]
    pub fn smoothed_rtt(&self) -> Duration {
        self.rtt_estimator.smoothed_rtt()
    }

    /// The derived retransmission timeout: `srtt + 4 * rttvar`.
    #[inline]
    pub fn retransmission_delay(&self) -> Duration {
        self.rtt_estimator.retransmission_delay()
    }

    /// Always zero: bandwidth estimation is out of scope for this
    /// controller. Any consumer that branches on this value must tolerate
    /// zero.
    #[inline]
    pub fn bandwidth_estimate(&self) -> u64 {
        0
    }

    /// How long the caller should wait before sending `transmission_type`
    /// carrying `has_retransmittable_data`. Returns `Duration::ZERO` to send
    /// now, `Duration::MAX` to mean "blocked, do not send".
    ///
    /// ACK-only packets, NACK-driven retransmissions, and handshake packets
    /// bypass congestion control entirely: withholding them would prevent
    /// the controller from ever learning anything.
    #[inline]
    pub fn time_until_send(
        &self,
        transmission_type: TransmissionType,
        has_retransmittable_data: HasRetransmittableData,
        is_handshake: bool,
    ) -> Duration {
        let bypasses_congestion_control = matches!(has_retransmittable_data, HasRetransmittableData::No)
            || matches!(transmission_type, TransmissionType::NackRetransmit)
            || is_handshake;

        if bypasses_congestion_control {
            return Duration::ZERO;
        }

        if self.available_send_window() > 0 {
            Duration::ZERO
        } else {
            Duration::MAX
        }
    }

    /// `max(0, min(receive_window, cwnd * MSS) - bytes_in_flight)`.
    #[inline]
    fn available_send_window(&self) -> u32 {
        let cwnd_bytes = self.congestion_window();
        let limit = self.receive_window.min(cwnd_bytes);
        limit.saturating_sub(*self.bytes_in_flight)
    }

    /// `bytes_in_flight >= cwnd*MSS`, or within one burst of that edge.
    /// Congestion avoidance growth only happens when this held at the time
    /// of the most recent send (see `cwnd_limited`): otherwise the
    /// application isn't pushing hard enough to probe capacity, and growing
    /// the window would be "free" and meaningless.
    #[inline]
    fn is_cwnd_limited(&self) -> bool {
        let cwnd_bytes = self.congestion_window();
        let bytes_in_flight = *self.bytes_in_flight;
        let burst_bytes = MAX_BURST_SEGMENTS * self.max_datagram_size as u32;

        bytes_in_flight >= cwnd_bytes || cwnd_bytes.saturating_sub(bytes_in_flight) <= burst_bytes
    }

    /// HyStart is only meaningful once the window is large enough to sample
    /// reliably.
    #[inline]
    fn hystart_applicable(&self) -> bool {
        self.cwnd >= HYSTART_LOW_WINDOW
    }

    /// Records a packet departing. Non-retransmittable packets (ACK-only)
    /// leave all state untouched.
    #[inline]
    pub fn on_packet_sent(
        &mut self,
        seq: u64,
        bytes: u32,
        transmission_type: TransmissionType,
        has_retransmittable_data: HasRetransmittableData,
    ) {
        if matches!(has_retransmittable_data, HasRetransmittableData::No) {
            return;
        }

        self.bytes_in_flight += bytes;
        self.cwnd_limited = self.is_cwnd_limited();

        if matches!(transmission_type, TransmissionType::First) && self.update_end_seq {
            self.end_seq = seq;
            if self.available_send_window() == 0 {
                self.update_end_seq = false;
            }
        }
    }

    /// Records a packet the transport has given up retransmitting.
    /// Abandonment is not loss: no window adjustment happens here.
    #[inline]
    pub fn on_packet_abandoned(&mut self, abandoned_bytes: u32) {
        self.sub_bytes_in_flight(abandoned_bytes);
    }

    /// Records an acknowledgement for `seq`, acknowledging `bytes_acked`
    /// bytes with an RTT sample of `rtt`, observed at `now`.
    #[inline]
    pub fn on_ack(&mut self, seq: u64, bytes_acked: u32, rtt: Duration, now: Timestamp) {
        self.sub_bytes_in_flight(bytes_acked);

        self.congestion_avoidance(seq, rtt, now);

        self.rtt_estimator.update_rtt(rtt);

        if seq == self.end_seq {
            self.update_end_seq = true;
        }
    }

    #[inline]
    fn congestion_avoidance(&mut self, seq: u64, rtt: Duration, now: Timestamp) {
        if !self.cwnd_limited {
            return;
        }

        if self.cwnd < self.ssthresh {
            if self.hystart.end_of_round(seq) {
                self.hystart.reset(self.end_seq);
            }

            if self.hystart_applicable() {
                let was_exited = self.hystart.exited();
                let min_rtt_global = self.rtt_estimator.min_rtt();
                self.hystart.update(rtt, min_rtt_global, now);

                if !was_exited {
                    if let Some(cause) = self.hystart.exit_cause() {
                        self.ssthresh = self.cwnd;
                        self.publisher.on_slow_start_exited(cause, self.cwnd);
                    }
                }
            }

            if self.cwnd < self.ssthresh && self.cwnd < self.max_cwnd {
                self.cwnd += 1;
            }
        } else if self.reno {
            self.cwnd_count += 1u32;
            if *self.cwnd_count >= self.cwnd {
                self.cwnd = (self.cwnd + 1).min(self.max_cwnd);
                self.cwnd_count.set(0);
            }
        } else {
            let min_rtt = self.rtt_estimator.min_rtt();
            let target = self.cubic.congestion_window_after_ack(self.cwnd, min_rtt, now);
            self.cwnd = target.min(self.max_cwnd);
        }
    }

    /// Applies a single multiplicative-decrease loss response. The caller
    /// is responsible for coalescing multiple losses within an RTT into a
    /// single call; this method does not dedupe (see the design notes on
    /// why this contract is preserved rather than silently changed).
    #[inline]
    pub fn on_loss(&mut self, _time: Timestamp) {
        if self.cwnd < self.ssthresh {
            self.publisher
                .on_slow_start_exited(SlowStartExitCause::Loss, self.cwnd);
        }

        let reduced = if self.reno {
            self.cwnd >> 1
        } else {
            self.cubic.congestion_window_after_packet_loss(self.cwnd)
        };

        self.cwnd = reduced.max(MINIMUM_CONGESTION_WINDOW);
        self.ssthresh = self.cwnd;

        self.publisher.on_packet_lost(self.cwnd, self.ssthresh);
    }

    /// Processes a peer feedback report: a running total of lost packets
    /// and the peer's current receive window. A single multiplicative
    /// decrease is applied if the loss counter increased since the last
    /// report, regardless of by how much. A counter that decreased (e.g.
    /// the peer restarted) is not treated as an error: the baseline simply
    /// resynchronises.
    #[inline]
    pub fn on_feedback(&mut self, peer_cumulative_lost: u64, peer_receive_window: u32, time: Timestamp) {
        if peer_cumulative_lost > self.last_lost_total {
            self.on_loss(time);
        }

        self.last_lost_total = peer_cumulative_lost;
        self.receive_window = peer_receive_window;
    }

    /// A retransmission timeout fired. Collapses to the minimum window and
    /// re-probes from slow start; `ssthresh` is deliberately left untouched
    /// so the subsequent slow start can re-discover it.
    #[inline]
    pub fn on_timeout(&mut self) {
        self.cubic.reset();
        self.cwnd = MINIMUM_CONGESTION_WINDOW;
    }

    /// Subtracts `bytes` from `bytes_in_flight`, clamping to zero and
    /// surfacing a diagnostic if the subtraction would have gone negative.
    /// This is a contract violation by the owning transport (an ack or
    /// abandonment for more bytes than are outstanding), not a programming
    /// bug in this crate, so it is tolerated rather than asserted.
    #[inline]
    fn sub_bytes_in_flight(&mut self, bytes: u32) {
        if *self.bytes_in_flight < bytes {
            self.publisher
                .on_precondition_violation(PreconditionViolation::BytesInFlightUnderflow);
        }

        self.bytes_in_flight -= bytes;
    }
}

impl<P: Publisher> Drop for CongestionController<P> {
    #[inline]
    fn drop(&mut self) {
        self.publisher.on_final_congestion_window(self.cwnd);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::testing::Recorder;
    use crate::time::testing::Clock;
    use crate::time::Clock as _;

    const MSS: u32 = 1460;

    fn reno_config() -> Config {
        Config::builder().growth_law(GrowthLaw::Reno).build().unwrap()
    }

    /// Fills the window with `count` packets, then acks all of them at a
    /// constant RTT, so each ack lands while the sender is genuinely
    /// cwnd-limited and slow start actually grows. A real sender streaming
    /// data keeps the pipe full this way; acking one packet at a time
    /// (as a naive test might) never re-fills the window and so never
    /// triggers growth, which would test nothing.
    fn fill_window_and_ack_all(
        controller: &mut CongestionController<Recorder>,
        clock: &Clock,
        count: u64,
        rtt: Duration,
    ) {
        for seq in 0..count {
            controller.on_packet_sent(
                seq,
                MSS,
                TransmissionType::First,
                HasRetransmittableData::Yes,
            );
        }

        for seq in 0..count {
            controller.on_ack(seq, MSS, rtt, clock.get_time());
        }
    }

    #[test]
    fn slow_start_growth_scenario() {
        let clock = Clock::default();
        let mut controller =
            CongestionController::with_publisher(reno_config(), Recorder::default());

        for seq in 0..10 {
            controller.on_packet_sent(
                seq,
                MSS,
                TransmissionType::First,
                HasRetransmittableData::Yes,
            );
        }

        assert_eq!(controller.congestion_window(), 10 * MSS);
        assert_eq!(controller.bytes_in_flight(), 10 * MSS);
        assert_eq!(
            controller.time_until_send(
                TransmissionType::First,
                HasRetransmittableData::Yes,
                false
            ),
            Duration::MAX
        );

        for seq in 0..10 {
            controller.on_ack(seq, MSS, Duration::from_millis(50), clock.get_time());
        }

        assert_eq!(controller.congestion_window(), 20 * MSS);
        assert_eq!(controller.bytes_in_flight(), 0);
        assert_eq!(controller.smoothed_rtt(), Duration::from_millis(50));
    }

    #[test]
    fn loss_halves_reno_window() {
        let clock = Clock::default();
        let mut controller =
            CongestionController::with_publisher(reno_config(), Recorder::default());

        fill_window_and_ack_all(&mut controller, &clock, 10, Duration::from_millis(50));
        assert_eq!(controller.congestion_window() / MSS, 20);

        controller.on_loss(clock.get_time());

        assert_eq!(controller.congestion_window() / MSS, 10);
        assert_eq!(
            controller.publisher.slow_start_exits,
            [(SlowStartExitCause::Loss, 20)]
        );
    }

    #[test]
    fn cubic_loss_with_fast_convergence() {
        let config = Config::builder().growth_law(GrowthLaw::Cubic).build().unwrap();
        let mut controller = CongestionController::with_publisher(config, Recorder::default());
        let now = Clock::default().get_time();

        // Establishes w_max = 200 via an initial loss at cwnd = 200...
        controller.set_congestion_window(200 * MSS);
        controller.on_loss(now);
        // ...then a second loss at cwnd = 100 should trigger fast
        // convergence, since 100 is below the standing w_max of 200.
        controller.set_congestion_window(100 * MSS);

        controller.on_loss(now);

        assert_eq!(controller.congestion_window() / MSS, 70);
        assert_eq!(controller.cubic.w_max(), Some(65));
    }

    #[test]
    fn timeout_collapses_window_and_preserves_ssthresh() {
        let clock = Clock::default();
        let mut controller =
            CongestionController::with_publisher(reno_config(), Recorder::default());
        fill_window_and_ack_all(&mut controller, &clock, 10, Duration::from_millis(50));
        controller.ssthresh = 42;

        controller.on_timeout();

        assert_eq!(controller.congestion_window() / MSS, 1);
        assert_eq!(controller.ssthresh, 42);
    }

    #[test]
    fn non_retransmittable_bypass() {
        let controller = CongestionController::with_publisher(reno_config(), Recorder::default());

        assert_eq!(
            controller.time_until_send(
                TransmissionType::First,
                HasRetransmittableData::No,
                false
            ),
            Duration::ZERO
        );
    }

    #[test]
    fn handshake_bypasses_even_when_retransmittable() {
        let mut controller =
            CongestionController::with_publisher(reno_config(), Recorder::default());
        controller.set_congestion_window(MSS); // fully utilise a 1-segment window
        controller.on_packet_sent(0, MSS, TransmissionType::First, HasRetransmittableData::Yes);

        assert_eq!(
            controller.time_until_send(
                TransmissionType::First,
                HasRetransmittableData::Yes,
                false
            ),
            Duration::MAX
        );
        assert_eq!(
            controller.time_until_send(TransmissionType::First, HasRetransmittableData::Yes, true),
            Duration::ZERO
        );
    }

    #[test]
    fn feedback_triggers_a_single_loss() {
        let clock = Clock::default();
        let mut controller =
            CongestionController::with_publisher(reno_config(), Recorder::default());
        fill_window_and_ack_all(&mut controller, &clock, 10, Duration::from_millis(50));
        controller.last_lost_total = 5;

        controller.on_feedback(8, DEFAULT_RECEIVE_WINDOW, clock.get_time());
        assert_eq!(controller.congestion_window() / MSS, 10);

        controller.on_feedback(8, DEFAULT_RECEIVE_WINDOW, clock.get_time());
        assert_eq!(controller.congestion_window() / MSS, 10);
    }

    #[test]
    fn over_ack_clamps_and_reports_precondition_violation() {
        let mut controller =
            CongestionController::with_publisher(reno_config(), Recorder::default());
        controller.on_packet_sent(0, MSS, TransmissionType::First, HasRetransmittableData::Yes);

        controller.on_ack(0, MSS * 10, Duration::from_millis(50), Clock::default().get_time());

        assert_eq!(controller.bytes_in_flight(), 0);
        assert_eq!(
            controller.publisher.precondition_violations,
            [PreconditionViolation::BytesInFlightUnderflow]
        );
    }

    #[test]
    fn set_from_config_applies_override_only_for_server() {
        let config = Config::builder()
            .growth_law(GrowthLaw::Reno)
            .server_initial_congestion_window(30)
            .build()
            .unwrap();

        let mut client = CongestionController::with_publisher(reno_config(), Recorder::default());
        client.set_from_config(&config, false);
        assert_eq!(
            client.congestion_window() / MSS,
            DEFAULT_INITIAL_CONGESTION_WINDOW
        );

        let mut server = CongestionController::with_publisher(reno_config(), Recorder::default());
        server.set_from_config(&config, true);
        assert_eq!(server.congestion_window() / MSS, 30);
    }

    /// Drives a full round through `on_ack` (rather than calling
    /// `HybridSlowStart::update` directly, as the unit tests in
    /// `hybrid_slow_start` do) so the exit is observed the way a transport
    /// would: ssthresh clamped to the cwnd at exit, growth stopping on the
    /// same ack that reports the exit, and exactly one diagnostic call.
    #[test]
    fn hystart_ack_train_exit_stops_growth_and_reports_once() {
        let mut clock = Clock::default();
        let mut controller =
            CongestionController::with_publisher(reno_config(), Recorder::default());
        controller.set_congestion_window(20 * MSS);
        controller.cwnd_limited = true;

        let min_rtt_global = Duration::from_millis(40);
        controller.rtt_estimator.update_rtt(min_rtt_global);
        controller.end_seq = 100;
        controller.hystart.reset(100);

        for _ in 0..7 {
            controller.on_ack(50, 0, min_rtt_global, clock.get_time());
            clock.inc_by(Duration::from_millis(10));
        }
        assert!(controller.publisher.slow_start_exits.is_empty());
        let cwnd_before_exit = controller.cwnd;

        controller.on_ack(50, 0, min_rtt_global, clock.get_time());

        assert_eq!(controller.ssthresh, cwnd_before_exit);
        assert_eq!(controller.cwnd, cwnd_before_exit);
        assert_eq!(
            controller.publisher.slow_start_exits,
            [(SlowStartExitCause::HyStartAckTrain, cwnd_before_exit)]
        );
    }

    #[test]
    fn drop_reports_final_congestion_window() {
        let controller = CongestionController::with_publisher(reno_config(), Recorder::default());
        let cwnd = controller.congestion_window() / MSS;
        drop(controller);
        let _ = cwnd;
    }
}
