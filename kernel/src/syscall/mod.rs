//! System-call interface
//!
//! One software interrupt (vector 0x80) carries the call number in EAX and
//! up to three arguments in EBX/ECX/EDX; the return value goes back in EAX.
//! [`dispatch_raw`] is the single point where internal `KernelResult`s are
//! flattened to the ABI integers: −1 for every failure except process
//! exhaustion, which is −2.

pub mod exec;
pub mod fileio;

/// System call numbers.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syscall {
    Halt = 1,
    Execute = 2,
    Read = 3,
    Write = 4,
    Open = 5,
    Close = 6,
    GetArgs = 7,
    VidMap = 8,
    SetHandler = 9,
    SigReturn = 10,
}

impl TryFrom<u32> for Syscall {
    type Error = ();

    fn try_from(raw: u32) -> Result<Self, ()> {
        match raw {
            1 => Ok(Syscall::Halt),
            2 => Ok(Syscall::Execute),
            3 => Ok(Syscall::Read),
            4 => Ok(Syscall::Write),
            5 => Ok(Syscall::Open),
            6 => Ok(Syscall::Close),
            7 => Ok(Syscall::GetArgs),
            8 => Ok(Syscall::VidMap),
            9 => Ok(Syscall::SetHandler),
            10 => Ok(Syscall::SigReturn),
            _ => Err(()),
        }
    }
}

/// Entry point called by the interrupt gate's trampoline.
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub extern "C" fn dispatch_raw(num: u32, a: u32, b: u32, c: u32) -> i32 {
    let syscall = match Syscall::try_from(num) {
        Ok(syscall) => syscall,
        Err(()) => return -1,
    };
    log::trace!("syscall {:?}({:#x}, {:#x}, {:#x})", syscall, a, b, c);

    match syscall {
        Syscall::Halt => exec::halt((a as u8) as u32),
        Syscall::Execute => exec::sys_execute(a as usize),
        Syscall::Read => flatten(fileio::read(a as usize, b as usize, c as usize)),
        Syscall::Write => flatten(fileio::write(a as usize, b as usize, c as usize)),
        Syscall::Open => flatten(fileio::open(a as usize)),
        Syscall::Close => flatten(fileio::close(a as usize)),
        Syscall::GetArgs => flatten(fileio::getargs(a as usize, b as usize)),
        Syscall::VidMap => flatten(fileio::vidmap(a as usize)),
        // Present for ABI completeness only.
        Syscall::SetHandler | Syscall::SigReturn => -1,
    }
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
fn flatten(result: crate::KernelResult<i32>) -> i32 {
    match result {
        Ok(value) => value,
        Err(err) => err.as_syscall_ret(),
    }
}
