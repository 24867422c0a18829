//! TriOS kernel binary
//!
//! `_start` (in `arch::x86::multiboot`) hands control here with the
//! multiboot magic and information pointer. Boot brings the subsystems up
//! in dependency order, arms the scheduler, and idles; from the first timer
//! tick onward the machine belongs to the three shells.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod boot {
    use trios_kernel::arch::x86::multiboot::{MultibootInfo, BOOTLOADER_MAGIC};
    use trios_kernel::arch::x86::{idt, pic};
    use trios_kernel::arch::interrupts;
    use trios_kernel::{drivers, fs, logger, mm, sched, terminal};

    #[no_mangle]
    pub extern "C" fn kernel_main(magic: u32, info_addr: u32) -> ! {
        logger::init();
        log::info!("trios kernel booting");

        if magic != BOOTLOADER_MAGIC {
            panic!("bad multiboot magic {:#x}", magic);
        }
        // SAFETY: The boot loader passes a valid multiboot information
        // structure below 1 MiB; it is only read here, before paging
        // could unmap it.
        let info = unsafe { &*(info_addr as *const MultibootInfo) };
        let fs_base = match info.fs_image_base() {
            Some(base) => base,
            None => panic!("boot loader provided no filesystem module"),
        };

        pic::init();
        idt::init();
        mm::paging::init();

        // SAFETY: Module 0 is the filesystem image, inside the kernel page.
        if let Err(err) = unsafe { fs::init(fs_base as *const u8) } {
            panic!("filesystem image rejected: {}", err);
        }

        terminal::init();
        drivers::console::with(|console| console.clear());
        drivers::keyboard::init();
        drivers::rtc::init();
        drivers::pit::init();

        sched::start();
        interrupts::enable();
        log::info!("boot complete, waiting for the first tick");

        loop {
            interrupts::halt();
        }
    }

    #[panic_handler]
    fn panic(info: &core::panic::PanicInfo) -> ! {
        interrupts::disable();
        log::error!("kernel panic: {}", info);
        trios_kernel::println_visible!("KERNEL PANIC: {}", info);
        loop {
            interrupts::halt();
        }
    }
}

#[cfg(not(target_os = "none"))]
fn main() {}
