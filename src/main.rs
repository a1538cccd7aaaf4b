#![cfg_attr(test, allow(unused_attributes))]
#![cfg_attr(all(not(test), target_arch = "arm"), no_std)]
#![cfg_attr(target_arch = "arm", no_main)]

#[cfg(target_arch = "arm")]
mod boot {
    use core::{
        arch::global_asm,
        mem,
        panic::PanicInfo,
        slice,
        sync::atomic::{compiler_fence, Ordering},
    };
    use raspbootin_lib::{
        devices::{
            atag::Atags,
            board::Board,
            receiver::{BootArgs, Entry, Receiver},
        },
        drivers::pl011::{config::Config, Pl011},
        protocol::{LOAD_ADDR, MAX_IMAGE_SIZE},
    };

    /// Words of tag list the loader is willing to walk.
    const ATAG_WINDOW_WORDS: usize = 1024;

    // The firmware drops the loader at 0x8000 with r0, r1 and r2 holding
    // the boot arguments. Copy the image up to where it was linked, clear
    // .bss and continue there, leaving the boot registers untouched.
    global_asm!(
        ".section .text.boot",
        ".arm",
        ".global _start",
        "_start:",
        "    mov sp, #0x8000",
        "    mov r3, #0x8000",
        "    ldr r4, =__loader_start",
        "    ldr r9, =__data_end",
        ".Lrelocate:",
        "    ldmia r3!, {{r5-r8}}",
        "    stmia r4!, {{r5-r8}}",
        "    cmp r4, r9",
        "    blo .Lrelocate",
        "    ldr r4, =__bss_start",
        "    ldr r9, =__bss_end",
        "    mov r5, #0",
        ".Lclear:",
        "    cmp r4, r9",
        "    strlo r5, [r4], #4",
        "    blo .Lclear",
        "    ldr r3, =kernel_main",
        "    blx r3",
        ".Lhalt:",
        "    wfe",
        "    b .Lhalt",
        ".ltorg",
    );

    #[no_mangle]
    pub extern "C" fn kernel_main(r0: u32, r1: u32, atags: *const u32) -> ! {
        let words: &[u32] = if atags.is_null() {
            &[]
        } else {
            // NOTE(Safety) The tag list lives in low memory, below the
            // stack and the load region, and is only ever read.
            unsafe { slice::from_raw_parts(atags, ATAG_WINDOW_WORDS) }
        };
        let args = BootArgs { r0, r1, atags: atags as usize };
        let atags = Atags::new(words, args.atags);
        let board = Board::detect(atags.cmdline());

        // NOTE(Safety) The board descriptor points at its own peripheral
        // window, and this is the only driver touching UART0.
        let serial = match unsafe { Pl011::new(board.gpio_base(), Config::default()) } {
            Ok(serial) => serial,
            Err(_) => halt(),
        };

        // NOTE(Safety) Everything between the load address and the
        // relocated loader is free memory reserved for the kernel.
        let region = unsafe { slice::from_raw_parts_mut(LOAD_ADDR as *mut u8, MAX_IMAGE_SIZE) };

        Receiver::new(serial).run(&args, board, atags, region, |args| {
            compiler_fence(Ordering::SeqCst);
            // NOTE(Safety) A complete image was just copied to the load
            // address, and its first instruction is its entry point.
            unsafe {
                let entry: Entry = mem::transmute(LOAD_ADDR);
                entry(args.r0, args.r1, args.atags);
            }
        })
    }

    fn halt() -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    #[panic_handler]
    fn panic(_: &PanicInfo) -> ! { halt() }
}

#[cfg(not(target_arch = "arm"))]
fn main() {
    eprintln!("raspbootin runs on the Raspberry Pi; build it for an ARM target.");
}
