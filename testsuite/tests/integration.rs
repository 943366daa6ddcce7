#![no_std]
#![no_main]

use testsuite::{self, State};

#[defmt_test::tests]
mod tests {
    use can_controller::filter::{ListEntry32, Mask16, Mask32};
    use can_controller::{
        DefmtDiagnostics, ExtendedId, Fifo, FilterMode, FilterScale, Frame, StandardId, TxError,
        TxState,
    };

    use super::*;

    #[init]
    fn init() -> State {
        State::init()
    }

    #[test]
    fn filter_banks(state: &mut State) {
        defmt::assert_eq!(state.can1.num_filter_banks(), 28);
        defmt::unwrap!(state.can1.clear_filters());
        defmt::assert!(!defmt::unwrap!(state.can1.filter_bank(27)).active);
        defmt::assert!(state.can1.filter_bank(28).is_none());

        defmt::unwrap!(state.can1.filter(
            27,
            Fifo::Fifo1,
            FilterScale::Scale16,
            FilterMode::List,
            0x1234_5678,
            0x9ABC_DEF0,
        ));
        let bank = defmt::unwrap!(state.can1.filter_bank(27));
        defmt::assert!(bank.active);
        defmt::assert_eq!(bank.fifo, Fifo::Fifo1);
        defmt::assert_eq!(bank.scale, FilterScale::Scale16);
        defmt::assert_eq!(bank.mode, FilterMode::List);
        defmt::assert_eq!(bank.fr1, 0x1234_5678);
        defmt::assert_eq!(bank.fr2, 0x9ABC_DEF0);

        defmt::unwrap!(state.can1.disable_bank(27));
        defmt::assert!(!defmt::unwrap!(state.can1.filter_bank(27)).active);
    }

    #[test]
    fn basic_roundtrip(state: &mut State) {
        defmt::unwrap!(state.can1.clear_filters());
        defmt::unwrap!(state.can1.enable_bank(0, Fifo::Fifo0, Mask32::accept_all()));

        let frame = Frame::new_data(StandardId::new(0).unwrap(), []);
        defmt::assert!(state.roundtrip_frame(&frame));

        let frame = Frame::new_data(ExtendedId::new(0xFFFF).unwrap(), [1, 2, 3, 4, 5]);
        defmt::assert!(state.roundtrip_frame(&frame));
    }

    #[test]
    fn no_filters_no_frames(state: &mut State) {
        defmt::unwrap!(state.can1.clear_filters());

        let frame = Frame::new_data(ExtendedId::new(0).unwrap(), []);
        defmt::assert!(!state.roundtrip_frame(&frame));
        let frame = Frame::new_data(StandardId::new(0).unwrap(), []);
        defmt::assert!(!state.roundtrip_frame(&frame));
    }

    #[test]
    fn fifo_assignment_and_filter_index(state: &mut State) {
        defmt::unwrap!(state.can1.clear_filters());
        defmt::unwrap!(state.can1.enable_bank(
            0,
            Fifo::Fifo1,
            Mask32::frames_with_std_id(StandardId::new(1).unwrap(), StandardId::MAX),
        ));
        defmt::unwrap!(state.can1.enable_bank(
            1,
            Fifo::Fifo0,
            Mask32::frames_with_std_id(StandardId::new(2).unwrap(), StandardId::MAX),
        ));

        let frame = Frame::new_data(StandardId::new(1).unwrap(), [1]);
        let mailbox = state.transmit_blocking(&frame);
        defmt::assert_eq!(state.wait_transmitted(mailbox), TxState::Success);
        defmt::assert_eq!(state.handler.on_receive_interrupt(Fifo::Fifo0), 0);
        defmt::assert_eq!(state.handler.on_receive_interrupt(Fifo::Fifo1), 1);
        let received = defmt::unwrap!(state.can1.receive().ok());
        defmt::assert_eq!(received, frame);
        // Bank 0 is the first bank of FIFO 1.
        defmt::assert_eq!(received.filter_match_index(), Some(0));

        let frame = Frame::new_data(StandardId::new(2).unwrap(), [2]);
        let mailbox = state.transmit_blocking(&frame);
        defmt::assert_eq!(state.wait_transmitted(mailbox), TxState::Success);
        defmt::assert_eq!(state.handler.on_receive_interrupt(Fifo::Fifo1), 0);
        defmt::assert_eq!(state.handler.on_receive_interrupt(Fifo::Fifo0), 1);
        let received = defmt::unwrap!(state.can1.receive().ok());
        defmt::assert_eq!(received, frame);
        defmt::assert_eq!(received.filter_match_index(), Some(0));
    }

    #[test]
    fn filter_mask32_std(state: &mut State) {
        let target_id = StandardId::new(42).unwrap();
        let mask = StandardId::MAX; // Exact match required

        defmt::unwrap!(state.can1.clear_filters());
        defmt::unwrap!(state.can1.enable_bank(
            0,
            Fifo::Fifo0,
            Mask32::frames_with_std_id(target_id, mask),
        ));

        // Data frames with matching IDs should be accepted.
        let frame = Frame::new_data(target_id, []);
        defmt::assert!(state.roundtrip_frame(&frame));

        let frame = Frame::new_data(target_id, [1, 2, 3, 4, 5, 6, 7, 8]);
        defmt::assert!(state.roundtrip_frame(&frame));

        // ...remote frames with the same IDs should also be accepted.
        let frame = defmt::unwrap!(Frame::new_remote(target_id, 0));
        defmt::assert!(state.roundtrip_frame(&frame));

        let frame = defmt::unwrap!(Frame::new_remote(target_id, 8));
        defmt::assert!(state.roundtrip_frame(&frame));

        // Different IDs should *not* be received.
        let frame = Frame::new_data(StandardId::new(1000).unwrap(), []);
        defmt::assert!(!state.roundtrip_frame(&frame));

        // Extended IDs that match the filter should be *rejected*.
        let frame = Frame::new_data(ExtendedId::new(target_id.as_raw().into()).unwrap(), []);
        defmt::assert!(!state.roundtrip_frame(&frame));

        // ...even when shifted upwards to match the standard ID bits.
        let frame = Frame::new_data(
            ExtendedId::new(u32::from(target_id.as_raw()) << 18).unwrap(),
            [],
        );
        defmt::assert!(!state.roundtrip_frame(&frame));
    }

    #[test]
    fn filter_mask32_ext(state: &mut State) {
        let target_id = ExtendedId::new(0).unwrap();
        let mask = ExtendedId::MAX; // Exact match required

        defmt::unwrap!(state.can1.clear_filters());
        defmt::unwrap!(state.can1.enable_bank(
            0,
            Fifo::Fifo0,
            Mask32::frames_with_ext_id(target_id, mask),
        ));

        let frame = Frame::new_data(target_id, [1, 2, 3, 4, 5, 6, 7, 8]);
        defmt::assert!(state.roundtrip_frame(&frame));

        let frame = defmt::unwrap!(Frame::new_remote(target_id, 7));
        defmt::assert!(state.roundtrip_frame(&frame));

        let frame = Frame::new_data(ExtendedId::new(1000).unwrap(), []);
        defmt::assert!(!state.roundtrip_frame(&frame));

        // Standard IDs should be *rejected* even if their value matches the filter mask.
        let frame = Frame::new_data(StandardId::new(0).unwrap(), []);
        defmt::assert!(!state.roundtrip_frame(&frame));
    }

    #[test]
    fn filter_mask16(state: &mut State) {
        let target_id_1 = StandardId::new(16).unwrap();
        let target_id_2 = StandardId::new(17).unwrap();
        let mask = StandardId::MAX; // Exact match required

        defmt::unwrap!(state.can1.clear_filters());
        defmt::unwrap!(state.can1.enable_bank(
            0,
            Fifo::Fifo0,
            [
                Mask16::frames_with_std_id(target_id_1, mask),
                Mask16::frames_with_std_id(target_id_2, mask),
            ],
        ));

        let frame = Frame::new_data(target_id_1, []);
        defmt::assert!(state.roundtrip_frame(&frame));
        let frame = Frame::new_data(target_id_2, []);
        defmt::assert!(state.roundtrip_frame(&frame));

        let frame = Frame::new_data(StandardId::new(15).unwrap(), []);
        defmt::assert!(!state.roundtrip_frame(&frame));

        // Extended frames whose upper bits match the filter value are *still* rejected.
        let frame = Frame::new_data(ExtendedId::new(16 << 18).unwrap(), []);
        defmt::assert!(!state.roundtrip_frame(&frame));
    }

    /// `List32` filter mode accepting standard CAN frames.
    #[test]
    fn filter_list32_std(state: &mut State) {
        let target_id_1 = StandardId::MAX;
        let target_id_2 = StandardId::new(42).unwrap();

        defmt::unwrap!(state.can1.clear_filters());
        defmt::unwrap!(state.can1.enable_bank(
            0,
            Fifo::Fifo0,
            [
                ListEntry32::data_frames_with_id(target_id_1),
                ListEntry32::remote_frames_with_id(target_id_2),
            ],
        ));

        let frame = Frame::new_data(target_id_1, []);
        defmt::assert!(state.roundtrip_frame(&frame));
        let frame = defmt::unwrap!(Frame::new_remote(target_id_2, 8));
        defmt::assert!(state.roundtrip_frame(&frame));

        // Data/Remote frame type must match.
        let frame = defmt::unwrap!(Frame::new_remote(target_id_1, 8));
        defmt::assert!(!state.roundtrip_frame(&frame));
        let frame = Frame::new_data(target_id_2, []);
        defmt::assert!(!state.roundtrip_frame(&frame));
    }

    /// `List32` filter mode accepting extended CAN frames.
    #[test]
    fn filter_list32_ext(state: &mut State) {
        let target_id_1 = ExtendedId::MAX;
        let target_id_2 = ExtendedId::new(42).unwrap();

        defmt::unwrap!(state.can1.clear_filters());
        defmt::unwrap!(state.can1.enable_bank(
            0,
            Fifo::Fifo0,
            [
                ListEntry32::data_frames_with_id(target_id_1),
                ListEntry32::remote_frames_with_id(target_id_2),
            ],
        ));

        let frame = Frame::new_data(target_id_1, []);
        defmt::assert!(state.roundtrip_frame(&frame));
        let frame = defmt::unwrap!(Frame::new_remote(target_id_2, 8));
        defmt::assert!(state.roundtrip_frame(&frame));

        let frame = defmt::unwrap!(Frame::new_remote(ExtendedId::new(43).unwrap(), 1));
        defmt::assert!(!state.roundtrip_frame(&frame));

        // Matching standard IDs are rejected.
        let frame = defmt::unwrap!(Frame::new_remote(StandardId::new(42).unwrap(), 1));
        defmt::assert!(!state.roundtrip_frame(&frame));
    }

    /// Saturates the mailboxes at a low bit rate and checks that every accepted frame arrives.
    #[test]
    fn mailboxes_exhausted(state: &mut State) {
        defmt::unwrap!(state.can1.clear_filters());
        defmt::unwrap!(state.can1.enable_bank(0, Fifo::Fifo0, Mask32::accept_all()));
        state.go_slow();
        defmt::assert!(state.can1.is_transmitter_idle());

        let mut sent = 0;
        let mut refused = false;
        for id in 0..5 {
            let frame = Frame::new_data(ExtendedId::new(id).unwrap(), []);
            match state.can1.transmit(&frame) {
                Ok(_) => sent += 1,
                Err(e) => {
                    defmt::assert_eq!(e, TxError::NoMailboxAvailable);
                    refused = true;
                }
            }
        }
        defmt::assert!(refused);

        // The hardware FIFO holds fewer frames than were sent.
        while !state.can1.is_transmitter_idle() {
            state.poll_receive();
        }
        state.handler.on_transmit_interrupt();
        state.poll_receive();
        defmt::assert_eq!(state.can1.available(), sent);
        defmt::assert_eq!(state.can1.overruns(), 0);

        state.can1.clear();
        defmt::assert_eq!(state.can1.available(), 0);
        state.go_fast();
    }

    #[test]
    fn set_mode_keeps_filters(state: &mut State) {
        defmt::unwrap!(state.can1.clear_filters());
        defmt::unwrap!(state.can1.enable_bank(0, Fifo::Fifo0, Mask32::accept_all()));

        defmt::unwrap!(state.can1.set_mode(
            can_controller::ControlFlags::LOOPBACK
                | can_controller::ControlFlags::SILENT
                | can_controller::ControlFlags::NO_AUTO_RETRANSMIT
        ));

        let frame = Frame::new_data(StandardId::new(7).unwrap(), [7; 8]);
        defmt::assert!(state.roundtrip_frame(&frame));
        state.go_fast();
    }

    #[test]
    fn diagnostics(state: &mut State) {
        let status = state.can1.error_status();
        defmt::assert!(!status.bus_off);
        state.can1.print_registers(&mut DefmtDiagnostics);
    }
}
