pub mod adapters;
pub mod async_runtime;
pub mod command;
pub mod dispatcher;
pub mod init_gate;
pub mod panel;
pub mod ports;
pub mod projection;
pub mod runner;
pub mod tools;

pub use adapters::{FsDuplicateScanner, UserDirsLocations};
pub use command::{AsyncRelayCommand, CanExecuteHandler, Command, Execution, RelayCommand};
pub use dispatcher::{DispatcherHandle, UiDispatcher};
pub use init_gate::{ensure_initialized, spawn_initialize, AsyncInitialize, InitGate};
pub use panel::{
    OperationContext, OperationEvent, OperationLauncher, OperationMessage, PanelProperty,
    ToolPanel,
};
pub use ports::*;
pub use projection::{
    ElapsedTicker, ProgressProjection, ProgressProperty, ProgressReporter, ProgressSink,
};
pub use runner::{OperationId, OperationRunner, OperationScope};
pub use tools::*;
