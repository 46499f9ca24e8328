use super::request::{Envelope, Request, RequestLine};
use super::response::{LockerView, OrderView, Response};
use crate::application::coordinator::LockerService;
use crate::application::devices::DeviceMonitor;
use crate::domain::auth::Identity;
use crate::domain::locker::LockerFilter;
use crate::domain::order::Order;
use crate::error::Result;
use serde::Serialize;
use serde_json::{Value, json};

/// Routes parsed requests to the service and turns every outcome, good or
/// bad, into a [`Response`].
pub struct Dispatcher<'a> {
    service: &'a LockerService,
    monitor: &'a DeviceMonitor,
}

type Outcome = Result<(String, Option<Value>)>;

fn data(value: impl Serialize) -> Result<Option<Value>> {
    Ok(Some(serde_json::to_value(value)?))
}

fn order_data(order: &Order) -> Result<Option<Value>> {
    data(OrderView::from(order))
}

impl<'a> Dispatcher<'a> {
    pub fn new(service: &'a LockerService, monitor: &'a DeviceMonitor) -> Self {
        Self { service, monitor }
    }

    pub async fn handle(&self, request: RequestLine) -> Response {
        let RequestLine {
            line,
            action,
            parsed,
        } = request;
        let outcome = match parsed {
            Ok(envelope) => self.run(envelope).await,
            Err(err) => Err(err),
        };
        match outcome {
            Ok((message, data)) => Response::ok(line, action, message, data),
            Err(err) => {
                tracing::debug!(line, action = %action, error = %err, "request failed");
                Response::failed(line, action, &err)
            }
        }
    }

    async fn run(&self, envelope: Envelope) -> Outcome {
        let caller = envelope
            .caller
            .map(Identity::new)
            .unwrap_or_else(Identity::anonymous);
        let service = self.service;

        match envelope.request {
            Request::ProvisionDevices { count } => {
                let devices = service.provision_devices(&caller, count).await?;
                Ok((format!("{} devices provisioned", devices.len()), data(&devices)?))
            }
            Request::ProvisionLockers {
                device_id,
                cabinet_count,
                doors_per_cabinet,
            } => {
                let lockers = service
                    .provision_lockers(&caller, &device_id, cabinet_count, doors_per_cabinet)
                    .await?;
                let views: Vec<LockerView> = lockers.iter().map(LockerView::from).collect();
                Ok((format!("{} lockers provisioned", views.len()), data(views)?))
            }
            Request::DeviceLogin { device_id } => {
                let device = self.monitor.login(&device_id).await?;
                Ok((format!("device {device_id} online"), data(device)?))
            }
            Request::DeviceHeartbeat { device_id } => {
                let device = self.monitor.heartbeat(&device_id).await?;
                Ok((format!("heartbeat from {device_id}"), data(device)?))
            }
            Request::ListFree {
                device_id,
                cabinet_no,
            } => {
                let filter = LockerFilter {
                    device_id,
                    cabinet_no,
                };
                let lockers = service.list_free(&filter).await?;
                let views: Vec<LockerView> = lockers.iter().map(LockerView::from).collect();
                Ok((format!("{} free lockers", views.len()), data(views)?))
            }
            Request::CreateOrder {
                locker_id,
                phone,
                code,
            } => {
                let order = service
                    .create_order(locker_id, &phone, code.as_deref())
                    .await?;
                Ok((format!("order {} created", order.id), order_data(&order)?))
            }
            Request::MockPay { order_id } => {
                let order = service.mock_pay_success(order_id).await?;
                Ok((format!("order {order_id} paid"), order_data(&order)?))
            }
            Request::GetOrder { order_id } => {
                let order = service.get_order(order_id).await?;
                Ok((format!("order {order_id}"), order_data(&order)?))
            }
            Request::OpenDoor {
                locker,
                order_id,
                mode,
            } => {
                let opened = service.open_door(&locker, order_id, mode).await?;
                Ok((format!("door {} opened", opened.address), data(opened)?))
            }
            Request::FinishOrder { order_id } => {
                let order = service.finish_order(order_id).await?;
                Ok((format!("order {order_id} completed"), order_data(&order)?))
            }
            Request::ForceFinish { order_id } => {
                let order = service.force_finish(&caller, order_id).await?;
                Ok((format!("order {order_id} force-finished"), order_data(&order)?))
            }
            Request::Refund { order_id } => {
                let order = service.refund(order_id).await?;
                Ok((format!("order {order_id} refunded"), order_data(&order)?))
            }
            Request::QueryByPhoneAndCode {
                phone,
                code,
                device_id,
            } => {
                let order = service
                    .query_by_phone_and_code(&phone, &code, device_id.as_ref())
                    .await?;
                Ok((format!("order {} found", order.id), order_data(&order)?))
            }
            Request::RecoverOrder {
                order_id,
                target_status,
            } => {
                let order = service.recover_order(order_id, target_status).await?;
                Ok((format!("order {order_id} recovered"), order_data(&order)?))
            }
            Request::OpenByPhone {
                device_id,
                phone,
                code,
            } => {
                let door_sort = service.open_by_phone(&device_id, &phone, &code).await?;
                Ok((
                    format!("door {door_sort} opened"),
                    Some(json!({ "door_sort": door_sort })),
                ))
            }
            Request::AmIAdmin => {
                let is_admin = service.is_admin(&caller);
                Ok((
                    format!("{caller} is {}an admin", if is_admin { "" } else { "not " }),
                    Some(json!({ "is_admin": is_admin })),
                ))
            }
            Request::GetBillingPolicy => {
                let policy = service.billing_policy().await;
                Ok(("current billing policy".to_string(), data(policy)?))
            }
            Request::SetBillingPolicy { policy } => {
                service.set_billing_policy(&caller, policy.clone()).await?;
                Ok(("billing policy updated".to_string(), data(policy)?))
            }
            Request::ListOrders { status } => {
                let orders = service.list_orders(status).await?;
                let views: Vec<OrderView> = orders.iter().map(OrderView::from).collect();
                Ok((format!("{} orders", views.len()), data(views)?))
            }
        }
    }
}
