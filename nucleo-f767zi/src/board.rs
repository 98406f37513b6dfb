/// APB1 kernel clock feeding the CAN controllers under
/// [`make_peripheral_config`].
pub const CAN_CLOCK_HZ: u32 = 54_000_000;

pub fn make_peripheral_config() -> embassy_stm32::Config {
    use embassy_stm32::rcc;
    use embassy_stm32::time::Hertz;

    let mut config = embassy_stm32::Config::default();
    // 8 MHz from the ST-LINK MCO.
    config.rcc.hse = Some(rcc::Hse {
        freq: Hertz::mhz(8),
        mode: rcc::HseMode::Bypass,
    });
    config.rcc.pll_src = rcc::PllSource::HSE;
    config.rcc.pll = Some(rcc::Pll {
        prediv: rcc::PllPreDiv::DIV4,
        mul: rcc::PllMul::MUL216,       // 432 MHz VCO
        divp: Some(rcc::PllPDiv::DIV2), // 216 MHz sysclock
        divq: Some(rcc::PllQDiv::DIV9), // 48 MHz for USB
        divr: None,
    });
    config.rcc.sys = rcc::Sysclk::PLL1_P;
    config.rcc.ahb_pre = rcc::AHBPrescaler::DIV1;
    config.rcc.apb1_pre = rcc::APBPrescaler::DIV4; // 54 MHz for CAN
    config.rcc.apb2_pre = rcc::APBPrescaler::DIV2;
    config
}
