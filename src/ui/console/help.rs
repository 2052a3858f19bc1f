pub const HELP: &str = r#"
Available commands:

b, break <file:line>        -- set a breakpoint, applied when the debugger is ready
d, delete <file:line>       -- remove a breakpoint
breakpoints                 -- show breakpoints and their state
c, continue                 -- continue program being debugged, after signal or breakpoint
n, next                     -- step program, stepping over subroutine calls
s, step                     -- step program until it reaches a different source line
finish                      -- execute program until selected stack frame returns
pause                       -- interrupt the running program (also Ctrl-C)
bt, backtrace               -- print backtrace of the stopped thread
vars <>|<frame number>      -- show local variables of a frame, innermost by default
expand <reference>          -- show members of a compound variable
p, print <expression>       -- evaluate an expression in the current frame
h, help                     -- show help
q, quit                     -- quit LLDB and exit
"#;
