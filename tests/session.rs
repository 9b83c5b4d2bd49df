use std::time::Duration;

use pretty_assertions::assert_eq;
use scan_chain::bank::{BankKind, ChainId, ChipLayout};
use scan_chain::config::{BoardConfig, ScanTiming};
use scan_chain::engine::{LoadImage, ReadLength, RunOutcome, ScanChain, UnloadLengths};
use scan_chain::gpio::sim::{NoDelay, SimulatedChip};
use scan_chain::gpio::Signal;
use scan_chain::{hexdump, Error};

fn layout(main: u32, input: u32, output: u32) -> ChipLayout {
    let mut layout = ChipLayout::default();
    layout.main.capacity = main;
    layout.input.capacity = input;
    layout.output.capacity = output;
    layout
}

fn engine(layout: ChipLayout, chip: SimulatedChip) -> ScanChain<SimulatedChip, NoDelay> {
    ScanChain::new(chip, NoDelay, layout, ScanTiming::default()).unwrap()
}

/// Deterministic pseudo random words
fn words(seed: u32, len: usize) -> Vec<u32> {
    let mut x = seed;
    (0..len)
        .map(|_| {
            x = x.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            x
        })
        .collect()
}

#[test]
fn every_bank_reads_back_what_was_written() {
    let layout = layout(33, 17, 9);
    let mut chain = engine(layout, SimulatedChip::new(&layout));
    for (i, kind) in [BankKind::Main, BankKind::Input, BankKind::Output].into_iter().enumerate() {
        let capacity = layout.bank(kind).capacity as usize;
        for len in [0, 1, capacity / 2, capacity - 1] {
            let data = words(i as u32 * 100 + len as u32, len);
            chain.write_bank(kind, &data).unwrap();
            let back = chain.read_bank(kind, ReadLength::from(Some(len as u32))).unwrap();
            if len == 0 {
                // zero means the whole bank
                assert_eq!(back.len(), capacity);
            } else {
                assert_eq!(back, data);
            }
        }
    }
}

#[test]
fn ten_row_bank_scenario() {
    let layout = layout(10, 10, 10);
    let mut chain = engine(layout, SimulatedChip::new(&layout).with_fill(0x5a5a_5a5a));
    chain.write_bank(BankKind::Input, &[1, 2, 3]).unwrap();

    assert_eq!(chain.read_bank(BankKind::Input, ReadLength::Words(3)).unwrap(), [1, 2, 3]);

    let all = chain.read_bank(BankKind::Input, ReadLength::All).unwrap();
    assert_eq!(all.len(), 10);
    assert_eq!(&all[..3], [1, 2, 3]);
    assert!(all[3..].iter().all(|w| *w == 0x5a5a_5a5a));

    let again = chain.read_bank(BankKind::Input, ReadLength::All).unwrap();
    assert_eq!(again, all);
}

#[test]
fn capacity_is_checked_before_the_bus_moves() {
    let layout = layout(10, 10, 10);
    let mut chain = engine(layout, SimulatedChip::new(&layout));
    let err = chain.write_bank(BankKind::Output, &[0; 10]).unwrap_err();
    assert!(matches!(err, Error::Capacity { bank: BankKind::Output, requested: 10, capacity: 10 }));
    assert_eq!(chain.gpio().ticks(), 0);
    chain.write_bank(BankKind::Output, &[0; 9]).unwrap();
}

#[test]
fn fault_appends_nothing_and_blocks_until_reset() {
    let layout = layout(10, 10, 10);
    let mut chain = engine(layout, SimulatedChip::new(&layout));
    chain.write_bank(BankKind::Main, &[10, 20, 30]).unwrap();

    // the second word's first sample
    chain.gpio().inject_valid_fault(32);
    let err = chain.read_bank(BankKind::Main, ReadLength::Words(3)).unwrap_err();
    assert!(matches!(err, Error::ProtocolFault { cycle: 0, .. }));
    assert!(err.is_fatal());
    assert!(matches!(
        chain.unload_session(UnloadLengths { main: ReadLength::All, ..Default::default() }),
        Err(Error::Desynchronized)
    ));

    chain.full_chain_clear().unwrap();
    assert_eq!(chain.read_bank(BankKind::Main, ReadLength::Words(3)).unwrap(), [10, 20, 30]);
}

#[test]
fn bring_up_session_from_hex_dumps() {
    let layout = layout(64, 32, 32);
    let program: Vec<u32> = words(7, 20);
    let data: Vec<u32> = words(11, 5);
    let program_dump = format!(
        "@00000000\n{}",
        hexdump::format(&hexdump::words_to_bytes(&program, 4))
    );
    let data_dump = hexdump::format(&hexdump::words_to_bytes(&data, 4));

    let chip = SimulatedChip::new(&layout).finish_after(10);
    let mut chain = engine(layout, chip);
    chain.clear_inputs().unwrap();

    let image = LoadImage::from_hex_dumps(&layout, &program_dump, Some(&data_dump)).unwrap();
    let loaded = chain.load_session(image).unwrap();
    assert_eq!(loaded.main, program);
    assert_eq!(loaded.input.as_deref(), Some(data.as_slice()));

    chain.configure_clock_generator(4, 2).unwrap();
    let outcome = chain.run_program(Duration::from_secs(60)).unwrap();
    assert!(matches!(outcome, RunOutcome::Completed(_)));

    let out = chain
        .unload_session(UnloadLengths {
            main: ReadLength::from(Some(program.len() as u32)),
            input: ReadLength::from(Some(data.len() as u32)),
            output: ReadLength::from(Some(0)),
        })
        .unwrap();
    assert_eq!(out.main, program);
    assert_eq!(out.input, data);
    assert_eq!(out.output.len(), 32);
    // left pointing at the main write target so the next run can finish
    assert_eq!(chain.selected(), Some(ChainId::MAIN_WRITE));
    assert!(chain.gpio().level(Signal::ChipReset));
}

#[test]
fn a_program_that_never_finishes_times_out() {
    let layout = ChipLayout::default();
    let mut chain = engine(layout, SimulatedChip::new(&layout));
    chain.load_session(LoadImage { main: vec![0x13], input: None }).unwrap();
    match chain.run_program(Duration::from_millis(2)).unwrap() {
        RunOutcome::TimedOut(waited) => assert_eq!(waited, Duration::from_millis(2)),
        other => panic!("expected a timeout, got {other:?}"),
    }
    // the banks are still readable afterwards
    let out = chain
        .unload_session(UnloadLengths { main: ReadLength::Words(1), ..Default::default() })
        .unwrap();
    assert_eq!(out.main, [0x13]);
    assert!(out.input.is_empty());
    assert!(out.output.is_empty());
}

#[test]
fn engine_from_board_config() {
    let config = BoardConfig::default();
    let chip = SimulatedChip::new(&config.layout);
    let mut chain = ScanChain::from_config(chip, NoDelay, &config).unwrap();
    assert_eq!(chain.layout().main.capacity, 4096);
    chain.set_inputs().unwrap();
    assert!(chain.gpio().level(Signal::ScanReset));
    chain.clear_inputs().unwrap();
    assert!(!chain.gpio().level(Signal::ScanReset));
}
